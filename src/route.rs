use crate::config::Preset;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SHOWCASE_ASSET: &str = "/assets/Mezz.glb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    With,
    Without,
}

impl Variant {
    pub fn asset_path(self) -> &'static str {
        match self {
            Self::With => "/assets/Mezzanine_3.glb",
            Self::Without => "/assets/Without_Mezzanine.glb",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Self::With => "with",
            Self::Without => "without",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::With => "With Mezzanine",
            Self::Without => "Without Mezzanine",
        }
    }
}

/// Navigable location inside the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Showcase,
    Individual { variant: Variant, unit_id: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("unknown path: {0}")]
    UnknownPath(String),
    #[error("unknown variant '{0}', expected 'with' or 'without'")]
    BadVariant(String),
    #[error("invalid unit id '{0}'")]
    BadUnitId(String),
}

impl Route {
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        let segments: Vec<&str> = path
            .trim()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        match segments.as_slice() {
            [] => Ok(Self::Showcase),
            ["individual", variant, unit_id] => {
                let variant = match *variant {
                    "with" => Variant::With,
                    "without" => Variant::Without,
                    other => return Err(RouteError::BadVariant(other.to_string())),
                };
                if !unit_id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    return Err(RouteError::BadUnitId(unit_id.to_string()));
                }
                Ok(Self::Individual {
                    variant,
                    unit_id: unit_id.to_string(),
                })
            }
            _ => Err(RouteError::UnknownPath(path.to_string())),
        }
    }

    /// Parse, falling back to the showcase with a warning.
    pub fn parse_or_home(path: &str) -> Self {
        Self::parse(path).unwrap_or_else(|err| {
            log::warn!("{err}; opening /");
            Self::Showcase
        })
    }

    pub fn preset(&self) -> Preset {
        match self {
            Self::Showcase => Preset::Showcase,
            Self::Individual { .. } => Preset::Individual,
        }
    }

    /// Asset path as served from the public assets directory.
    pub fn asset_path(&self) -> &'static str {
        match self {
            Self::Showcase => SHOWCASE_ASSET,
            Self::Individual { variant, .. } => variant.asset_path(),
        }
    }

    pub fn unit_id(&self) -> Option<&str> {
        match self {
            Self::Showcase => None,
            Self::Individual { unit_id, .. } => Some(unit_id),
        }
    }

    pub fn variant(&self) -> Option<Variant> {
        match self {
            Self::Showcase => None,
            Self::Individual { variant, .. } => Some(*variant),
        }
    }

    pub fn with_variant(&self, variant: Variant) -> Self {
        match self {
            Self::Showcase => Self::Showcase,
            Self::Individual { unit_id, .. } => Self::Individual {
                variant,
                unit_id: unit_id.clone(),
            },
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Showcase => f.write_str("/"),
            Self::Individual { variant, unit_id } => {
                write!(f, "/individual/{}/{}", variant.slug(), unit_id)
            }
        }
    }
}

/// Map a public asset path like `/assets/Mezz.glb` onto a directory on disk.
pub fn resolve_asset(assets_dir: &Path, public_path: &str) -> PathBuf {
    let relative = public_path
        .trim_start_matches('/')
        .strip_prefix("assets/")
        .unwrap_or(public_path.trim_start_matches('/'));
    assets_dir.join(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_showcase() {
        assert_eq!(Route::parse("/"), Ok(Route::Showcase));
        assert_eq!(Route::parse(""), Ok(Route::Showcase));
    }

    #[test]
    fn individual_route_round_trips_through_display() {
        let route = Route::parse("/individual/without/12");
        assert_eq!(
            route,
            Ok(Route::Individual {
                variant: Variant::Without,
                unit_id: "12".to_string()
            })
        );
        assert_eq!(
            route.map(|r| r.to_string()),
            Ok("/individual/without/12".to_string())
        );
    }

    #[test]
    fn bad_variant_and_unknown_path_are_rejected() {
        assert_eq!(
            Route::parse("/individual/maybe/3"),
            Err(RouteError::BadVariant("maybe".to_string()))
        );
        assert!(matches!(
            Route::parse("/settings"),
            Err(RouteError::UnknownPath(_))
        ));
        assert_eq!(Route::parse_or_home("/individual/with/../x"), Route::Showcase);
    }

    #[test]
    fn variant_switch_keeps_unit() {
        let route = Route::Individual {
            variant: Variant::With,
            unit_id: "7".to_string(),
        };
        let switched = route.with_variant(Variant::Without);
        assert_eq!(switched.asset_path(), "/assets/Without_Mezzanine.glb");
        assert_eq!(switched.unit_id(), Some("7"));
    }

    #[test]
    fn public_paths_resolve_under_assets_dir() {
        let path = resolve_asset(Path::new("public/assets"), "/assets/Mezz.glb");
        assert_eq!(path, PathBuf::from("public/assets/Mezz.glb"));
    }
}
