//! unitview: native glTF viewer for building models with hoverable units.
//!
//! Opens a window, loads a model on a worker thread, plays an intro camera
//! move and then hands the camera to orbit controls. The showcase view
//! highlights unit meshes under the pointer; the individual view frames a
//! single building variant for one unit.

mod app;
mod assets;
mod config;
mod render;
mod route;
mod scene;
mod ui;

use app::LaunchOptions;
use clap::Parser;
use config::Preset;
use route::Route;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "unitview", version, about = "Native glTF unit viewer")]
struct Cli {
    /// Viewer route: `/` or `/individual/{with|without}/{unitId}`.
    #[arg(default_value = "/")]
    route: String,

    /// View this .glb/.gltf file instead of the route's asset.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory served as `/assets`.
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// JSON file laid over the preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force a preset instead of the one the route implies.
    #[arg(long, value_enum)]
    preset: Option<Preset>,
}

impl Cli {
    fn into_options(self) -> LaunchOptions {
        LaunchOptions {
            route: Route::parse_or_home(&self.route),
            model: self.model,
            assets_dir: self.assets,
            config_path: self.config,
            preset: self.preset,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = Cli::parse().into_options();
    match app::run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event loop error: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_showcase() {
        let options = Cli::parse_from(["unitview"]).into_options();
        assert_eq!(options.route, Route::Showcase);
        assert_eq!(options.assets_dir, PathBuf::from("assets"));
        assert!(options.model.is_none() && options.preset.is_none());
    }

    #[test]
    fn cli_parses_route_and_flags() {
        let options = Cli::parse_from([
            "unitview",
            "/individual/without/12",
            "--config",
            "tuning.json",
            "--preset",
            "showcase",
        ])
        .into_options();
        assert_eq!(options.route.unit_id(), Some("12"));
        assert_eq!(options.config_path, Some(PathBuf::from("tuning.json")));
        assert_eq!(options.preset, Some(Preset::Showcase));
    }
}
