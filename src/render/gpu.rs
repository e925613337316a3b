//! wgpu backend for [`SceneRenderer`].
//!
//! Three passes per frame: shadow depth from the main light, the lit scene
//! (opaque first, then blended back to front), and the egui overlay on top.

use super::{FrameInput, RenderError, SceneRenderer};
use crate::app::egui_host::EguiFrameOutput;
use crate::scene::material::{Material, MaterialKind, TextureId};
use crate::scene::{GeometryId, SceneGraph};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
    };

    const POSITION_ONLY: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3],
    };
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    main_light: [f32; 4],
    fill_light: [f32; 4],
    ambient: [f32; 4],
    environment: [f32; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    color: [f32; 4],
    emissive: [f32; 4],
    surface: [f32; 4],
    flags: [f32; 4],
}

impl ObjectUniform {
    fn new(model: Mat4, material: &Material, receive_shadow: bool) -> Self {
        let kind = match material.kind {
            MaterialKind::Standard => 0.0,
            MaterialKind::Basic => 1.0,
            MaterialKind::ShadowCatcher => 2.0,
        };
        let [r, g, b] = material.color;
        let emissive = Vec3::from(material.emissive) * material.emissive_intensity;
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            color: [r, g, b, material.opacity],
            emissive: emissive.extend(0.0).to_array(),
            surface: [material.roughness, material.metalness, 0.0, 0.0],
            flags: [
                kind,
                if material.map.is_some() { 1.0 } else { 0.0 },
                if receive_shadow { 1.0 } else { 0.0 },
                0.0,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PipelineKind {
    Opaque,
    DoubleSided,
    Blended,
    /// Front faces only, pulled toward the camera to beat coplanar faces.
    Biased,
}

impl PipelineKind {
    fn for_material(material: &Material) -> Self {
        if material.depth_bias {
            Self::Biased
        } else if material.is_blended() {
            Self::Blended
        } else if material.double_sided {
            Self::DoubleSided
        } else {
            Self::Opaque
        }
    }
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct Draw {
    geometry: GeometryId,
    texture: Option<TextureId>,
    pipeline: PipelineKind,
    casts_shadow: bool,
    depth: f32,
}

struct ShadowMap {
    size: u32,
    view: wgpu::TextureView,
}

struct GpuState {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    shadow: ShadowMap,

    globals_buffer: wgpu::Buffer,
    globals_group: wgpu::BindGroup,
    shadow_globals_buffer: wgpu::Buffer,
    shadow_globals_group: wgpu::BindGroup,

    object_layout: wgpu::BindGroupLayout,
    object_buffer: wgpu::Buffer,
    object_group: wgpu::BindGroup,
    object_stride: u64,
    object_capacity: u64,

    material_layout: wgpu::BindGroupLayout,
    base_sampler: wgpu::Sampler,
    white_group: wgpu::BindGroup,
    texture_groups: HashMap<TextureId, wgpu::BindGroup>,

    pipelines: HashMap<PipelineKind, wgpu::RenderPipeline>,
    shadow_pipeline: wgpu::RenderPipeline,

    meshes: HashMap<GeometryId, GpuMesh>,
    egui: egui_wgpu::Renderer,
}

/// Renderer bound to one window for one viewer session.
pub struct WgpuRenderer {
    gpu: Option<GpuState>,
}

impl WgpuRenderer {
    pub fn new(window: Arc<Window>, shadow_map_size: u32) -> Result<Self, RenderError> {
        let gpu = pollster::block_on(GpuState::new(window, shadow_map_size))?;
        Ok(Self { gpu: Some(gpu) })
    }
}

impl SceneRenderer for WgpuRenderer {
    fn upload_scene(&mut self, scene: &SceneGraph) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.sync(scene);
        }
    }

    fn render(&mut self, frame: &FrameInput<'_>) -> Result<(), RenderError> {
        match self.gpu.as_mut() {
            Some(gpu) => gpu.render(frame),
            None => Ok(()),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(width, height);
        }
    }

    fn dispose(&mut self) {
        let Some(gpu) = self.gpu.take() else {
            return;
        };
        log::debug!(
            "renderer disposed: {} meshes, {} textures",
            gpu.meshes.len(),
            gpu.texture_groups.len()
        );
        gpu.destroy();
    }

    fn is_disposed(&self) -> bool {
        self.gpu.is_none()
    }
}

impl Drop for WgpuRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl GpuState {
    async fn new(window: Arc<Window>, shadow_map_size: u32) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(Arc::clone(&window))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or(RenderError::Adapter)?;
        log::info!("GPU adapter: {}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("unitview-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        let mut config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or(RenderError::SurfaceUnsupported)?;
        let capabilities = surface.get_capabilities(&adapter);
        if let Some(format) = capabilities.formats.iter().copied().find(|f| f.is_srgb()) {
            config.format = format;
        }
        surface.configure(&device, &config);
        let depth_view = create_depth(&device, config.width, config.height);
        let shadow = create_shadow_map(&device, shadow_map_size);

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Depth,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let globals_group =
            create_globals_group(&device, &globals_layout, &globals_buffer, &shadow, &shadow_sampler);

        let shadow_globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow-globals"),
            size: std::mem::size_of::<[[f32; 4]; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shadow_globals_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("shadow-globals-layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let shadow_globals_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-globals"),
            layout: &shadow_globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_globals_buffer.as_entire_binding(),
            }],
        });

        let object_size = std::mem::size_of::<ObjectUniform>() as u64;
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let object_stride = object_size.div_ceil(alignment) * alignment;
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(object_size),
                },
                count: None,
            }],
        });
        let object_capacity = 64;
        let (object_buffer, object_group) =
            create_object_buffer(&device, &object_layout, object_stride, object_capacity);

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let base_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("base-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let white = upload_rgba(&device, &queue, "white", 1, 1, &[255, 255, 255, 255]);
        let white_group = create_material_group(&device, &material_layout, &white, &base_sampler);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });
        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene-pipeline-layout"),
            bind_group_layouts: &[&globals_layout, &object_layout, &material_layout],
            push_constant_ranges: &[],
        });
        let pipelines = [
            PipelineKind::Opaque,
            PipelineKind::DoubleSided,
            PipelineKind::Blended,
            PipelineKind::Biased,
        ]
        .into_iter()
        .map(|kind| {
            let pipeline = create_scene_pipeline(&device, &scene_layout, &shader, config.format, kind);
            (kind, pipeline)
        })
        .collect();

        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shadow.wgsl").into()),
        });
        let shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&shadow_globals_layout, &object_layout],
            push_constant_ranges: &[],
        });
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow-pipeline"),
            layout: Some(&shadow_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: Some("vs_shadow"),
                buffers: &[Vertex::POSITION_ONLY],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let egui = egui_wgpu::Renderer::new(&device, config.format, None, 1, false);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth_view,
            shadow,
            globals_buffer,
            globals_group,
            shadow_globals_buffer,
            shadow_globals_group,
            object_layout,
            object_buffer,
            object_group,
            object_stride,
            object_capacity,
            material_layout,
            base_sampler,
            white_group,
            texture_groups: HashMap::new(),
            pipelines,
            shadow_pipeline,
            meshes: HashMap::new(),
            egui,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth(&self.device, width, height);
    }

    fn sync(&mut self, scene: &SceneGraph) {
        for (_, mesh, _) in scene.meshes() {
            if !self.meshes.contains_key(&mesh.geometry) {
                if let Some(geometry) = scene.geometry(mesh.geometry) {
                    let vertices: Vec<Vertex> = geometry
                        .positions
                        .iter()
                        .enumerate()
                        .map(|(i, p)| Vertex {
                            position: p.to_array(),
                            normal: geometry.normals.get(i).map_or([0.0, 1.0, 0.0], |n| n.to_array()),
                            uv: geometry.uvs.get(i).map_or([0.0, 0.0], |uv| uv.to_array()),
                        })
                        .collect();
                    let gpu_mesh = GpuMesh {
                        vertices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("mesh-vertices"),
                            contents: bytemuck::cast_slice(&vertices),
                            usage: wgpu::BufferUsages::VERTEX,
                        }),
                        indices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("mesh-indices"),
                            contents: bytemuck::cast_slice(&geometry.indices),
                            usage: wgpu::BufferUsages::INDEX,
                        }),
                        index_count: geometry.indices.len() as u32,
                    };
                    self.meshes.insert(mesh.geometry, gpu_mesh);
                }
            }
            let map = scene
                .materials
                .get(mesh.material)
                .and_then(|material| material.map);
            if let Some(id) = map {
                if !self.texture_groups.contains_key(&id) {
                    if let Some(texture) = scene.materials.texture(id) {
                        let gpu_texture = upload_rgba(
                            &self.device,
                            &self.queue,
                            "base-map",
                            texture.width,
                            texture.height,
                            &texture.rgba,
                        );
                        let group = create_material_group(
                            &self.device,
                            &self.material_layout,
                            &gpu_texture,
                            &self.base_sampler,
                        );
                        self.texture_groups.insert(id, group);
                    }
                }
            }
        }
    }

    fn render(&mut self, frame: &FrameInput<'_>) -> Result<(), RenderError> {
        self.sync(frame.scene);

        let camera_position = frame.camera.position;
        let mut uniforms = Vec::new();
        let mut draws = Vec::new();
        for (_, mesh, world) in frame.scene.meshes() {
            let Some(material) = frame.scene.materials.get(mesh.material) else {
                continue;
            };
            if !self.meshes.contains_key(&mesh.geometry) {
                continue;
            }
            let center = world.transform_point3(
                frame
                    .scene
                    .geometry(mesh.geometry)
                    .map(|g| g.bounds().center())
                    .unwrap_or(Vec3::ZERO),
            );
            uniforms.push(ObjectUniform::new(world, material, mesh.receive_shadow));
            draws.push(Draw {
                geometry: mesh.geometry,
                texture: material.map,
                pipeline: PipelineKind::for_material(material),
                casts_shadow: mesh.cast_shadow,
                depth: center.distance_squared(camera_position),
            });
        }
        self.write_objects(&uniforms);
        self.write_globals(frame);

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(err) => return Err(RenderError::Frame(err)),
        };
        let target = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame"),
            });

        self.shadow_pass(&mut encoder, &draws);
        self.scene_pass(&mut encoder, &target, &draws, frame.lighting.background);

        let mut command_buffers = Vec::new();
        if let Some(overlay) = frame.overlay {
            command_buffers = self.overlay_pass(&mut encoder, &target, overlay);
        }
        command_buffers.push(encoder.finish());
        self.queue.submit(command_buffers);
        self.window.pre_present_notify();
        surface_texture.present();

        if let Some(overlay) = frame.overlay {
            for id in &overlay.textures_delta.free {
                self.egui.free_texture(id);
            }
        }
        Ok(())
    }

    fn write_globals(&self, frame: &FrameInput<'_>) {
        let lights = frame.lights;
        let lighting = frame.lighting;
        let environment = frame
            .scene
            .environment
            .map(|env| Vec3::from(env.color) * env.intensity)
            .unwrap_or(Vec3::ZERO);
        let light_view_proj = lights.main.shadow_view_projection();
        let globals = Globals {
            view_proj: frame.camera.view_projection().to_cols_array_2d(),
            light_view_proj: light_view_proj.to_cols_array_2d(),
            camera_pos: frame.camera.position.extend(1.0).to_array(),
            main_light: lights.main.direction().extend(lights.main.intensity).to_array(),
            fill_light: lights.fill.direction().extend(lights.fill.intensity).to_array(),
            ambient: Vec4::new(lights.ambient, lights.ambient, lights.ambient, 0.0).to_array(),
            environment: environment.extend(0.0).to_array(),
            params: [
                lighting.exposure,
                lights.main.shadow_bias,
                1.0 / self.shadow.size.max(1) as f32,
                if lights.main.cast_shadow { 1.0 } else { 0.0 },
            ],
        };
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
        self.queue.write_buffer(
            &self.shadow_globals_buffer,
            0,
            bytemuck::bytes_of(&light_view_proj.to_cols_array_2d()),
        );
    }

    fn write_objects(&mut self, uniforms: &[ObjectUniform]) {
        let needed = uniforms.len() as u64;
        if needed > self.object_capacity {
            let capacity = needed.next_power_of_two();
            let (buffer, group) =
                create_object_buffer(&self.device, &self.object_layout, self.object_stride, capacity);
            self.object_buffer = buffer;
            self.object_group = group;
            self.object_capacity = capacity;
        }
        let stride = self.object_stride as usize;
        let mut staging = vec![0u8; uniforms.len() * stride];
        for (slot, uniform) in staging.chunks_exact_mut(stride).zip(uniforms) {
            let bytes = bytemuck::bytes_of(uniform);
            slot[..bytes.len()].copy_from_slice(bytes);
        }
        if !staging.is_empty() {
            self.queue.write_buffer(&self.object_buffer, 0, &staging);
        }
    }

    fn object_offset(&self, index: usize) -> u32 {
        (index as u64 * self.object_stride) as u32
    }

    fn shadow_pass(&self, encoder: &mut wgpu::CommandEncoder, draws: &[Draw]) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow-pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.shadow.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.shadow_pipeline);
        pass.set_bind_group(0, &self.shadow_globals_group, &[]);
        for (index, draw) in draws.iter().enumerate() {
            if !draw.casts_shadow {
                continue;
            }
            let Some(mesh) = self.meshes.get(&draw.geometry) else {
                continue;
            };
            pass.set_bind_group(1, &self.object_group, &[self.object_offset(index)]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    fn scene_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        draws: &[Draw],
        background: [f32; 3],
    ) {
        let [r, g, b] = background;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(r),
                        g: f64::from(g),
                        b: f64::from(b),
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, &self.globals_group, &[]);

        let mut order: Vec<usize> = (0..draws.len()).collect();
        // Opaque kinds first; blended last and farthest first.
        order.sort_by(|&a, &b| {
            let (da, db) = (&draws[a], &draws[b]);
            let blended_a = da.pipeline == PipelineKind::Blended;
            let blended_b = db.pipeline == PipelineKind::Blended;
            blended_a
                .cmp(&blended_b)
                .then_with(|| {
                    if blended_a {
                        db.depth.total_cmp(&da.depth)
                    } else {
                        std::cmp::Ordering::Equal
                    }
                })
        });

        let mut bound: Option<PipelineKind> = None;
        for index in order {
            let draw = &draws[index];
            let Some(mesh) = self.meshes.get(&draw.geometry) else {
                continue;
            };
            if bound != Some(draw.pipeline) {
                if let Some(pipeline) = self.pipelines.get(&draw.pipeline) {
                    pass.set_pipeline(pipeline);
                }
                bound = Some(draw.pipeline);
            }
            let material_group = draw
                .texture
                .and_then(|id| self.texture_groups.get(&id))
                .unwrap_or(&self.white_group);
            pass.set_bind_group(1, &self.object_group, &[self.object_offset(index)]);
            pass.set_bind_group(2, material_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    fn overlay_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        overlay: &EguiFrameOutput,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, delta) in &overlay.textures_delta.set {
            self.egui.update_texture(&self.device, &self.queue, *id, delta);
        }
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: overlay.screen_size_px,
            pixels_per_point: overlay.pixels_per_point,
        };
        let command_buffers = self.egui.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &overlay.clipped_primitives,
            &screen,
        );
        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.egui
            .render(&mut pass, &overlay.clipped_primitives, &screen);
        command_buffers
    }

    /// Drop GPU objects in dependency order, then the device.
    fn destroy(self) {
        let GpuState {
            surface,
            device,
            meshes,
            texture_groups,
            ..
        } = self;
        for mesh in meshes.values() {
            mesh.vertices.destroy();
            mesh.indices.destroy();
        }
        drop(texture_groups);
        drop(surface);
        device.destroy();
    }
}

fn create_depth(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_shadow_map(device: &wgpu::Device, size: u32) -> ShadowMap {
    let size = size.clamp(1, device.limits().max_texture_dimension_2d);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("shadow-map"),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SHADOW_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    ShadowMap {
        size,
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
    }
}

fn create_globals_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    shadow: &ShadowMap,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("globals"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&shadow.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_object_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    stride: u64,
    capacity: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("objects"),
        size: stride * capacity.max(1),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("objects"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<ObjectUniform>() as u64),
            }),
        }],
    });
    (buffer, group)
}

fn upload_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::Texture {
    device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        rgba,
    )
}

fn create_material_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("material"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_scene_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    kind: PipelineKind,
) -> wgpu::RenderPipeline {
    let (cull_mode, blend, depth_write, bias) = match kind {
        PipelineKind::Opaque => (Some(wgpu::Face::Back), None, true, Default::default()),
        PipelineKind::DoubleSided => (None, None, true, Default::default()),
        PipelineKind::Blended => (
            None,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            false,
            Default::default(),
        ),
        PipelineKind::Biased => (
            Some(wgpu::Face::Back),
            None,
            true,
            wgpu::DepthBiasState {
                constant: -4,
                slope_scale: -1.0,
                clamp: 0.0,
            },
        ),
    };
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("scene-pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::LAYOUT],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            cull_mode,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth_write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias,
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_uniform_flags_follow_material() {
        let catcher = Material::shadow_catcher(0.5);
        let uniform = ObjectUniform::new(Mat4::IDENTITY, &catcher, true);
        assert_eq!(uniform.flags[0], 2.0);
        assert_eq!(uniform.flags[2], 1.0);
        assert_eq!(uniform.color[3], 0.5);
    }

    #[test]
    fn pipeline_choice() {
        let mut material = Material::standard([1.0; 3]);
        assert_eq!(PipelineKind::for_material(&material), PipelineKind::Opaque);
        material.double_sided = true;
        assert_eq!(PipelineKind::for_material(&material), PipelineKind::DoubleSided);
        material.transparent = true;
        assert_eq!(PipelineKind::for_material(&material), PipelineKind::Blended);
        material.depth_bias = true;
        assert_eq!(PipelineKind::for_material(&material), PipelineKind::Biased);
        assert_eq!(
            PipelineKind::for_material(&Material::shadow_catcher(0.2)),
            PipelineKind::Blended
        );
    }

    #[test]
    fn uniform_sizes_match_shader() {
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 192);
        assert_eq!(std::mem::size_of::<Globals>(), 224);
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }
}
