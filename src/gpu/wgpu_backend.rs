//! wgpu implementation of [`RenderBackend`].
//!
//! Each draw is its own render pass over a fullscreen triangle. Uniforms go
//! through a ring of 256-byte slots addressed with dynamic offsets; when the
//! ring is full the recorded commands are submitted early so no slot is
//! overwritten before the draw that reads it executes.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::constants::gpu::{TEXTURE_SLOTS, UNIFORM_SLOTS_PER_SUBMIT, UNIFORM_SLOT_STRIDE};
use crate::error::{shader_compile_error, shader_link_error, FluidError, FluidResult};
use crate::gpu::backend::{DrawCall, DrawTarget, PassParams, ProgramId, RenderBackend};
use crate::gpu::capability::{CapabilityProfile, Channels, StorageFormat};
use crate::gpu::device::{texture_format, GpuContext};
use crate::present::MaskImage;
use crate::shaders::{BlendMode, ProgramKind, ProgramOutput, ShaderKeywords};
use crate::targets::{FilterMode, TargetDesc, TargetId, TextureSource};

const PARAMS_SIZE: u64 = std::mem::size_of::<PassParams>() as u64;

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TargetDesc,
}

struct GpuProgram {
    kind: ProgramKind,
    pipelines: FxHashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    /// Set when a deferred validation error arrives after compile returned.
    failed: Arc<AtomicBool>,
}

struct GpuMask {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

pub struct WgpuBackend {
    context: GpuContext,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    next_slot: u64,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    dummy_view: wgpu::TextureView,
    _dummy: wgpu::Texture,
    targets: FxHashMap<TargetId, GpuTarget>,
    next_target: u32,
    programs: FxHashMap<ProgramId, GpuProgram>,
    next_program: u32,
    mask: Option<GpuMask>,
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    surface_drawn: bool,
    clear_color: wgpu::Color,
}

impl WgpuBackend {
    pub fn new(context: GpuContext, transparent: bool) -> Self {
        let device = &context.device;
        let filterable = context.profile.supports_linear_filter;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Params Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(PARAMS_SIZE),
                },
                count: None,
            }],
        });

        let sampler_type = if filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        let mut texture_entries = Vec::with_capacity(TEXTURE_SLOTS * 2);
        for slot in 0..TEXTURE_SLOTS as u32 {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        for slot in 0..TEXTURE_SLOTS as u32 {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: TEXTURE_SLOTS as u32 + slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Textures Layout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pass Params Ring"),
            size: UNIFORM_SLOT_STRIDE * UNIFORM_SLOTS_PER_SUBMIT,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pass Params"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniforms,
                    offset: 0,
                    size: NonZeroU64::new(PARAMS_SIZE),
                }),
            }],
        });

        let sampler = |filter: wgpu::FilterMode, label: &str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear_sampler = sampler(wgpu::FilterMode::Linear, "Linear Sampler");
        let nearest_sampler = sampler(wgpu::FilterMode::Nearest, "Nearest Sampler");

        // Bound to unused slots
        let dummy = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Empty Slot"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let dummy_view = dummy.create_view(&wgpu::TextureViewDescriptor::default());

        let clear_color = if transparent {
            wgpu::Color::TRANSPARENT
        } else {
            wgpu::Color::BLACK
        };

        log::info!(
            "[WgpuBackend::new] Ready: {} storage, surface {:?}",
            context.profile.storage.name(),
            context.config.format
        );

        Self {
            context,
            texture_layout,
            pipeline_layout,
            uniforms,
            uniform_bind_group,
            next_slot: 0,
            linear_sampler,
            nearest_sampler,
            dummy_view,
            _dummy: dummy,
            targets: FxHashMap::default(),
            next_target: 0,
            programs: FxHashMap::default(),
            next_program: 0,
            mask: None,
            encoder: None,
            frame: None,
            surface_drawn: false,
            clear_color,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Distinct texture formats fields can be allocated with.
    fn field_formats(&self) -> Vec<wgpu::TextureFormat> {
        let profile = &self.context.profile;
        let mut formats: Vec<_> = [Channels::R, Channels::Rg, Channels::Rgba]
            .into_iter()
            .map(|channels| texture_format(profile.target_format(channels)))
            .collect();
        formats.dedup();
        formats
    }

    fn create_pipeline(
        &self,
        module: &wgpu::ShaderModule,
        kind: ProgramKind,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let blend = match kind.blend() {
            BlendMode::Replace => None,
            BlendMode::Premultiplied => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        };
        self.context
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(kind.name()),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
    }

    /// Resolve the innermost error scope.
    ///
    /// Native builds block on the result. On the web the result arrives
    /// later and only marks the program as failed for subsequent draws.
    fn pop_scope(&self, failed: &Arc<AtomicBool>) -> Option<wgpu::Error> {
        let scope = self.context.device.pop_error_scope();

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = failed;
            pollster::block_on(scope)
        }

        #[cfg(target_arch = "wasm32")]
        {
            let failed = failed.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if let Some(error) = scope.await {
                    log::error!("[WgpuBackend::pop_scope] Deferred validation error: {}", error);
                    failed.store(true, Ordering::Relaxed);
                }
            });
            None
        }
    }

    fn acquire_frame(&mut self) -> FluidResult<()> {
        if self.frame.is_some() {
            return Ok(());
        }
        match self.context.surface.get_current_texture() {
            Ok(frame) => {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some((frame, view));
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                log::warn!("[WgpuBackend::acquire_frame] Surface lost, reconfiguring");
                self.context
                    .surface
                    .configure(&self.context.device, &self.context.config);
                Err(FluidError::Surface("surface lost, frame skipped".to_string()))
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("[WgpuBackend::acquire_frame] Out of memory acquiring surface");
                Err(FluidError::ContextLost)
            }
            Err(e) => Err(FluidError::Surface(e.to_string())),
        }
    }

    /// Submit recorded work and rewind the uniform ring.
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.context.queue.submit(std::iter::once(encoder.finish()));
        }
        self.next_slot = 0;
    }

    fn input_view(&self, source: Option<TextureSource>) -> FluidResult<(&wgpu::TextureView, FilterMode)> {
        match source {
            None => Ok((&self.dummy_view, FilterMode::Nearest)),
            Some(TextureSource::Target(id)) => self
                .targets
                .get(&id)
                .map(|target| (&target.view, target.desc.filter))
                .ok_or(FluidError::UnknownTarget(id)),
            Some(TextureSource::Mask) => self
                .mask
                .as_ref()
                .map(|mask| (&mask.view, FilterMode::Linear))
                .ok_or_else(|| FluidError::Mask("no mask uploaded".to_string())),
        }
    }

    fn sampler(&self, filter: FilterMode) -> &wgpu::Sampler {
        match filter {
            FilterMode::Linear if self.context.profile.supports_linear_filter => &self.linear_sampler,
            _ => &self.nearest_sampler,
        }
    }

    fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        call: &DrawCall,
        uniform_offset: u32,
    ) -> FluidResult<()> {
        let program = self
            .programs
            .get(&call.program)
            .ok_or_else(|| shader_link_error("unknown", format!("{:?}", call.program)))?;
        if program.failed.load(Ordering::Relaxed) {
            return Err(shader_compile_error(program.kind.name(), "program failed validation"));
        }

        let (view, format, load) = match call.output {
            DrawTarget::Field(id) => {
                let target = self.targets.get(&id).ok_or(FluidError::UnknownTarget(id))?;
                (
                    &target.view,
                    texture_format(target.desc.format),
                    wgpu::LoadOp::Load,
                )
            }
            DrawTarget::Surface => {
                let (_, view) = self
                    .frame
                    .as_ref()
                    .ok_or_else(|| FluidError::Surface("no surface frame acquired".to_string()))?;
                let load = if self.surface_drawn {
                    wgpu::LoadOp::Load
                } else {
                    wgpu::LoadOp::Clear(self.clear_color)
                };
                (view, self.context.config.format, load)
            }
        };

        let pipeline = program.pipelines.get(&format).ok_or_else(|| {
            shader_link_error(program.kind.name(), format!("no pipeline for {:?}", format))
        })?;

        let mut inputs = Vec::with_capacity(TEXTURE_SLOTS);
        for source in call.inputs {
            inputs.push(self.input_view(source)?);
        }
        let mut entries = Vec::with_capacity(TEXTURE_SLOTS * 2);
        for (slot, (input_view, _)) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: wgpu::BindingResource::TextureView(input_view),
            });
        }
        for (slot, (_, filter)) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (TEXTURE_SLOTS + slot) as u32,
                resource: wgpu::BindingResource::Sampler(self.sampler(*filter)),
            });
        }
        let textures = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pass Textures"),
                layout: &self.texture_layout,
                entries: &entries,
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.kind.name()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[uniform_offset]);
        pass.set_bind_group(1, &textures, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn read_texels(&mut self, id: TargetId) -> FluidResult<Vec<[f32; 4]>> {
        let target = self.targets.get(&id).ok_or(FluidError::UnknownTarget(id))?;
        let desc = target.desc;
        let channels = desc.format.channels.count();
        let element_bytes = match desc.format.storage {
            StorageFormat::HalfFloat => 2,
            StorageFormat::Float => 4,
            StorageFormat::Unorm8 => 1,
        };
        let row_bytes = desc.width * (channels * element_bytes) as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = (row_bytes + align - 1) / align * align;

        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: padded_row as u64 * desc.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            target.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(desc.height),
                },
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.context.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| FluidError::Readback(e.to_string()))?
            .map_err(|e| FluidError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut texels = Vec::with_capacity((desc.width * desc.height) as usize);
        for row in data.chunks(padded_row as usize) {
            for texel_bytes in row[..row_bytes as usize].chunks_exact(channels * element_bytes) {
                let mut texel = [0.0, 0.0, 0.0, 1.0];
                for (channel, bytes) in texel_bytes.chunks_exact(element_bytes).enumerate() {
                    texel[channel] = decode_channel(desc.format.storage, bytes);
                }
                texels.push(texel);
            }
        }
        drop(data);
        buffer.unmap();
        Ok(texels)
    }
}

fn decode_channel(storage: StorageFormat, bytes: &[u8]) -> f32 {
    match storage {
        StorageFormat::HalfFloat => f16_to_f32(u16::from_le_bytes([bytes[0], bytes[1]])),
        StorageFormat::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        StorageFormat::Unorm8 => bytes[0] as f32 / 255.0,
    }
}

fn f16_to_f32(bits: u16) -> f32 {
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x3ff) as u32;
    let magnitude = match exponent {
        0 => mantissa as f32 * 2f32.powi(-24),
        0x1f if mantissa == 0 => f32::INFINITY,
        0x1f => f32::NAN,
        _ => f32::from_bits(((exponent + 112) << 23) | (mantissa << 13)),
    };
    if bits & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

impl RenderBackend for WgpuBackend {
    fn capabilities(&self) -> &CapabilityProfile {
        &self.context.profile
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.context.config.width, self.context.config.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> FluidResult<()> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == self.surface_size() {
            return Ok(());
        }
        self.frame = None;
        self.context.config.width = width;
        self.context.config.height = height;
        self.context
            .surface
            .configure(&self.context.device, &self.context.config);
        log::debug!("[WgpuBackend::resize_surface] {}x{}", width, height);
        Ok(())
    }

    fn create_target(&mut self, desc: &TargetDesc) -> FluidResult<TargetId> {
        let limit = self.context.device.limits().max_texture_dimension_2d;
        if desc.width > limit || desc.height > limit {
            return Err(FluidError::UnsupportedFormat {
                format: format!("{}x{} exceeds the {} texel limit", desc.width, desc.height, limit),
            });
        }

        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Field"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TargetId(self.next_target);
        self.next_target += 1;
        self.targets.insert(
            id,
            GpuTarget {
                texture,
                view,
                desc: *desc,
            },
        );
        Ok(id)
    }

    fn release_target(&mut self, id: TargetId) {
        if let Some(target) = self.targets.remove(&id) {
            target.texture.destroy();
        }
    }

    fn compile_program(
        &mut self,
        kind: ProgramKind,
        keywords: ShaderKeywords,
        wgsl: &str,
    ) -> FluidResult<ProgramId> {
        let failed = Arc::new(AtomicBool::new(false));
        let label = format!("{} {:?}", kind.name(), keywords);

        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        if let Some(error) = self.pop_scope(&failed) {
            return Err(shader_compile_error(kind.name(), error));
        }

        let formats = match kind.output() {
            ProgramOutput::Surface => vec![self.context.config.format],
            ProgramOutput::Field => self.field_formats(),
        };

        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = formats
            .into_iter()
            .map(|format| (format, self.create_pipeline(&module, kind, format)))
            .collect();
        if let Some(error) = self.pop_scope(&failed) {
            return Err(shader_link_error(kind.name(), error));
        }

        let id = ProgramId(self.next_program);
        self.next_program += 1;
        self.programs.insert(
            id,
            GpuProgram {
                kind,
                pipelines,
                failed,
            },
        );
        Ok(id)
    }

    fn release_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn upload_mask(&mut self, mask: &MaskImage) -> FluidResult<()> {
        let mask = mask.fit_within(self.context.device.limits().max_texture_dimension_2d)?;
        let size = wgpu::Extent3d {
            width: mask.width(),
            height: mask.height(),
            depth_or_array_layers: 1,
        };

        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Mask"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.context.queue.write_texture(
            texture.as_image_copy(),
            mask.pixels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * mask.width()),
                rows_per_image: Some(mask.height()),
            },
            size,
        );
        if let Some(error) = self.pop_scope(&Arc::new(AtomicBool::new(false))) {
            texture.destroy();
            return Err(FluidError::Mask(format!("upload failed: {}", error)));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.mask = Some(GpuMask {
            _texture: texture,
            view,
        });
        log::info!(
            "[WgpuBackend::upload_mask] {}x{} mask uploaded",
            mask.width(),
            mask.height()
        );
        Ok(())
    }

    fn clear_mask(&mut self) {
        self.mask = None;
    }

    fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    fn draw(&mut self, call: &DrawCall) -> FluidResult<()> {
        call.check_aliasing()?;
        if call.output == DrawTarget::Surface {
            self.acquire_frame()?;
        }
        if self.next_slot >= UNIFORM_SLOTS_PER_SUBMIT {
            self.flush();
        }

        let offset = self.next_slot * UNIFORM_SLOT_STRIDE;
        self.context
            .queue
            .write_buffer(&self.uniforms, offset, bytemuck::bytes_of(&call.params));
        self.next_slot += 1;

        let mut encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        };
        let result = self.record(&mut encoder, call, offset as u32);
        self.encoder = Some(encoder);

        if result.is_ok() && call.output == DrawTarget::Surface {
            self.surface_drawn = true;
        }
        result
    }

    fn end_frame(&mut self) -> FluidResult<()> {
        self.flush();
        if let Some((frame, _view)) = self.frame.take() {
            frame.present();
        }
        self.surface_drawn = false;
        Ok(())
    }

    fn read_target(&mut self, id: TargetId) -> FluidResult<Vec<[f32; 4]>> {
        self.flush();

        #[cfg(not(target_arch = "wasm32"))]
        {
            self.read_texels(id)
        }

        #[cfg(target_arch = "wasm32")]
        {
            Err(FluidError::Readback(format!(
                "synchronous readback of {:?} is unavailable on the web",
                id
            )))
        }
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        for (_, target) in self.targets.drain() {
            target.texture.destroy();
        }
        log::debug!("[WgpuBackend::drop] Released device resources");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_float_decoding() {
        assert_eq!(f16_to_f32(0x0000), 0.0);
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x3800), 0.5);
        assert_eq!(f16_to_f32(0x7c00), f32::INFINITY);
        assert!(f16_to_f32(0x7e00).is_nan());
        assert_eq!(f16_to_f32(0x0001), 2f32.powi(-24));
    }

    #[test]
    fn test_uniform_slots_fit_params() {
        assert!(PARAMS_SIZE <= UNIFORM_SLOT_STRIDE);
    }
}
