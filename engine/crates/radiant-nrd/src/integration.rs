//! 降噪引擎集成
//!
//! 初始化时根据引擎声明创建 sampler、compute pipeline 与纹理池；
//! 每帧把视图参数交给引擎，再依次执行引擎给出的 dispatch。

use itertools::Itertools;
use radiant_gfx::binding::{GfxBindingLayoutDesc, GfxBindingSetDesc, GfxBindingSetItem, GfxBindingType, GfxShaderStages};
use radiant_gfx::commands::{GfxCommandList, GfxComputeState};
use radiant_gfx::device::{GfxDevice, GfxShaderCompiler};
use radiant_gfx::handles::{
    GfxBindingLayoutHandle, GfxBufferHandle, GfxComputePipelineHandle, GfxSamplerHandle, GfxTextureHandle,
};
use radiant_gfx::pipeline::{GfxComputePipelineDesc, GfxShaderDesc, GfxShaderMacro};
use radiant_gfx::resources::{GfxBufferDesc, GfxTextureDesc};
use radiant_gfx::sampler::GfxSamplerDesc;
use radiant_render_graph::{RgBindingCache, RgDispatchAccess, RgHazardTracker, RgStage};
use radiant_render_interface::view::PlanarView;

use crate::engine::{
    AccumulationMode, CommonSettings, DenoiserEngine, DenoiserMethod, DescriptorType, ReblurSettings, ResourceType,
    SamplerMode,
};
use crate::error::NrdError;
use crate::render_targets::RenderTargets;

const SHADER_DIR: &str = "nrd/RayTracingDenoiser/Shaders/Source/";

struct NrdPipeline {
    binding_layout: GfxBindingLayoutHandle,
    pipeline: GfxComputePipelineHandle,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisocclusionThresholds {
    pub threshold: f32,
    pub alternate: f32,
    pub use_alternate_mix: bool,
}
impl Default for DisocclusionThresholds {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            alternate: 0.05,
            use_alternate_mix: false,
        }
    }
}

/// 每帧交给降噪器的输入
pub struct NrdFrameInputs<'a> {
    pub view: &'a PlanarView,
    pub view_prev: &'a PlanarView,
    pub frame_index: u32,
    pub disocclusion: DisocclusionThresholds,
    pub enable_validation: bool,
    pub method_settings: Option<&'a ReblurSettings>,
    /// 丢弃历史，重新开始累积
    pub reset: bool,
}

pub struct NrdIntegration {
    engine: Box<dyn DenoiserEngine>,
    method: DenoiserMethod,
    initialized: bool,
    instance_created: bool,

    constant_buffer: Option<GfxBufferHandle>,
    pipelines: Vec<NrdPipeline>,
    samplers: Vec<GfxSamplerHandle>,
    permanent_textures: Vec<GfxTextureHandle>,
    transient_textures: Vec<GfxTextureHandle>,

    binding_cache: RgBindingCache,
}
// new & init
impl NrdIntegration {
    pub fn new(engine: Box<dyn DenoiserEngine>, method: DenoiserMethod) -> Self {
        Self {
            engine,
            method,
            initialized: false,
            instance_created: false,
            constant_buffer: None,
            pipelines: Vec::new(),
            samplers: Vec::new(),
            permanent_textures: Vec::new(),
            transient_textures: Vec::new(),
            binding_cache: RgBindingCache::default(),
        }
    }

    /// 失败时功能被禁用，`is_available` 返回 false
    pub fn initialize(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        width: u32,
        height: u32,
    ) -> bool {
        match self.try_initialize(device, compiler, width, height) {
            Ok(()) => {
                log::info!(
                    "denoiser {:?} initialized: {} pipelines, {} permanent + {} transient textures",
                    self.method,
                    self.pipelines.len(),
                    self.permanent_textures.len(),
                    self.transient_textures.len()
                );
                self.initialized = true;
            }
            Err(err) => {
                log::error!("denoiser initialization failed: {err}");
                self.destroy(device);
            }
        }
        self.initialized
    }

    fn try_initialize(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        width: u32,
        height: u32,
    ) -> Result<(), NrdError> {
        self.engine.create_instance(self.method)?;
        self.instance_created = true;

        let instance_desc = self.engine.describe_requirements().clone();

        let constant_buffer = device
            .create_buffer(&GfxBufferDesc::volatile_constant(
                instance_desc.constant_buffer_max_data_size as u64,
                "NrdConstantBuffer",
            ))
            .map_err(|e| NrdError::gfx("constant buffer", e))?;
        self.constant_buffer = Some(constant_buffer);

        for mode in &instance_desc.samplers {
            let desc = match mode {
                SamplerMode::NearestClamp => GfxSamplerDesc::clamp(ash::vk::Filter::NEAREST),
                SamplerMode::LinearClamp => GfxSamplerDesc::clamp(ash::vk::Filter::LINEAR),
                other => return Err(NrdError::UnsupportedSampler(*other)),
            };
            let sampler = device.create_sampler(&desc).map_err(|e| NrdError::gfx("sampler", e))?;
            self.samplers.push(sampler);
        }

        assert_eq!(instance_desc.samplers_space_index, 0, "denoiser samplers must live in register space 0");
        let macros = vec![
            GfxShaderMacro::new("NRD_COMPILER_DXC", "1"),
            GfxShaderMacro::new("NRD_NORMAL_ENCODING", "2"),
            GfxShaderMacro::new("NRD_ROUGHNESS_ENCODING", "1"),
        ];
        for pipeline_desc in &instance_desc.pipelines {
            let source = format!("{SHADER_DIR}{}", pipeline_desc.shader_file_name);
            let shader = compiler
                .compile_shader(&GfxShaderDesc::compute(&source, &pipeline_desc.shader_entry_point, macros.clone()))
                .map_err(|e| NrdError::gfx(format!("shader {source}"), e))?;

            // slot 顺序：constant buffer, samplers..., resource ranges...
            let mut layout_desc = GfxBindingLayoutDesc::new(GfxShaderStages::COMPUTE, 0, &pipeline_desc.shader_file_name)
                .item(instance_desc.constant_buffer_register_index, GfxBindingType::VolatileConstantBuffer);
            for sampler_index in 0..instance_desc.samplers.len() as u32 {
                layout_desc =
                    layout_desc.item(instance_desc.samplers_base_register_index + sampler_index, GfxBindingType::Sampler);
            }
            for range in &pipeline_desc.resource_ranges {
                let ty = binding_type(range.descriptor_type);
                for offset in 0..range.descriptors_num {
                    layout_desc = layout_desc.item(range.base_register_index + offset, ty);
                }
            }
            let binding_layout = device
                .create_binding_layout(&layout_desc)
                .map_err(|e| NrdError::gfx(format!("binding layout for {source}"), e))?;

            let pipeline = device
                .create_compute_pipeline(&GfxComputePipelineDesc {
                    shader,
                    binding_layouts: vec![binding_layout],
                    debug_name: pipeline_desc.shader_file_name.clone(),
                })
                .map_err(|e| NrdError::gfx(format!("pipeline for {source}"), e))?;

            self.pipelines.push(NrdPipeline {
                binding_layout,
                pipeline,
            });
        }

        let pools = instance_desc
            .permanent_pool
            .iter()
            .enumerate()
            .map(|(i, desc)| (true, i, desc))
            .chain(instance_desc.transient_pool.iter().enumerate().map(|(i, desc)| (false, i, desc)));
        for (is_permanent, index, texture_desc) in pools {
            let name = format!("NRD {}Texture [{index}]", if is_permanent { "Permanent" } else { "Transient" });
            let format = texture_desc.format.to_vk();
            if format == ash::vk::Format::UNDEFINED {
                return Err(NrdError::UnsupportedFormat {
                    format: texture_desc.format,
                    name,
                });
            }

            let texture = device
                .create_texture(&GfxTextureDesc::new_2d_uav(width, height, format, &name))
                .map_err(|e| NrdError::gfx(name.clone(), e))?;
            if is_permanent {
                self.permanent_textures.push(texture);
            } else {
                self.transient_textures.push(texture);
            }
        }

        Ok(())
    }
}
// destroy
impl NrdIntegration {
    /// 提交之后调用
    pub fn release_retired(&mut self, device: &mut dyn GfxDevice) {
        self.binding_cache.release_retired(device);
    }

    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        self.binding_cache.clear(device);
        for texture in self.permanent_textures.drain(..).chain(self.transient_textures.drain(..)) {
            device.destroy_texture(texture);
        }
        for sampler in self.samplers.drain(..) {
            device.destroy_sampler(sampler);
        }
        for pipeline in self.pipelines.drain(..) {
            device.destroy_compute_pipeline(pipeline.pipeline);
            device.destroy_binding_layout(pipeline.binding_layout);
        }
        if let Some(buffer) = self.constant_buffer.take() {
            device.destroy_buffer(buffer);
        }
        if self.instance_created {
            self.engine.destroy_instance();
            self.instance_created = false;
        }
        self.initialized = false;
    }
}
// getters
impl NrdIntegration {
    #[inline]
    pub fn is_available(&self) -> bool {
        self.initialized
    }
    #[inline]
    pub fn method(&self) -> DenoiserMethod {
        self.method
    }
    #[inline]
    pub fn binding_cache(&self) -> &RgBindingCache {
        &self.binding_cache
    }
}
// run
impl NrdIntegration {
    /// 执行引擎本帧的全部 dispatch
    ///
    /// 调用前必须检查 [`Self::is_available`]。引擎返回未知资源或越界索引时直接 panic，
    /// 这意味着集成代码与引擎版本不匹配。
    pub fn run_denoiser_passes(
        &mut self,
        device: &mut dyn GfxDevice,
        cmd: &mut GfxCommandList,
        tracker: &mut RgHazardTracker,
        targets: &RenderTargets,
        inputs: &NrdFrameInputs,
    ) -> anyhow::Result<()> {
        assert!(self.initialized, "run_denoiser_passes called on an unavailable denoiser");
        let constant_buffer = self.constant_buffer.ok_or_else(|| anyhow::anyhow!("denoiser constant buffer missing"))?;

        if let Some(settings) = inputs.method_settings {
            self.engine.set_method_settings(settings);
        }
        self.engine.set_common_settings(&build_common_settings(inputs));

        let dispatches = self.engine.compute_dispatches();
        let instance_desc = self.engine.describe_requirements();

        for dispatch in &dispatches {
            if let Some(name) = &dispatch.name {
                cmd.begin_marker(name);
            }

            cmd.write_buffer_bytes(constant_buffer, &dispatch.constant_buffer_data);

            let mut items = vec![GfxBindingSetItem::volatile_constant_buffer(
                instance_desc.constant_buffer_register_index,
                constant_buffer,
            )];
            items.extend(self.samplers.iter().enumerate().map(|(i, sampler)| {
                GfxBindingSetItem::sampler(instance_desc.samplers_base_register_index + i as u32, *sampler)
            }));

            assert!(
                dispatch.pipeline_index < self.pipelines.len(),
                "denoiser dispatch references pipeline {} of {}",
                dispatch.pipeline_index,
                self.pipelines.len()
            );
            let pipeline_desc = &instance_desc.pipelines[dispatch.pipeline_index];

            let mut access = RgDispatchAccess::new("nrd");
            let mut resources = dispatch.resources.iter();
            for range in &pipeline_desc.resource_ranges {
                for offset in 0..range.descriptors_num {
                    let Some(resource) = resources.next() else {
                        panic!(
                            "denoiser dispatch declares {} resources, pipeline expects {}",
                            dispatch.resources.len(),
                            pipeline_desc.resources_num()
                        );
                    };
                    let texture = self.resolve_resource(*resource, targets);
                    let slot = range.base_register_index + offset;
                    match range.descriptor_type {
                        DescriptorType::Texture => {
                            items.push(GfxBindingSetItem::texture_srv(slot, texture));
                            access = access.read_image(texture, RgStage::Compute);
                        }
                        DescriptorType::StorageTexture => {
                            items.push(GfxBindingSetItem::texture_uav(slot, texture));
                            access = access.read_write_image(texture, RgStage::Compute);
                        }
                    }
                }
            }
            assert!(
                resources.next().is_none(),
                "denoiser dispatch declares {} resources, pipeline expects {}",
                dispatch.resources.len(),
                pipeline_desc.resources_num()
            );

            let pipeline = &self.pipelines[dispatch.pipeline_index];
            let binding_set =
                self.binding_cache.get_or_create(device, pipeline.binding_layout, &GfxBindingSetDesc::new(items))?;

            tracker.prepare_dispatch(cmd, &access);
            cmd.dispatch(
                &GfxComputeState {
                    pipeline: pipeline.pipeline,
                    bindings: vec![binding_set],
                },
                dispatch.grid_width,
                dispatch.grid_height,
            );

            if dispatch.name.is_some() {
                cmd.end_marker();
            }
        }

        log::trace!(
            "denoiser dispatched {} passes: {}",
            dispatches.len(),
            dispatches.iter().filter_map(|d| d.name.as_deref()).collect_vec().join(", ")
        );
        Ok(())
    }

    fn resolve_resource(&self, resource: ResourceType, targets: &RenderTargets) -> GfxTextureHandle {
        let pooled = |pool: &[GfxTextureHandle], index: u32, name: &str| match pool.get(index as usize) {
            Some(texture) => *texture,
            None => panic!("denoiser {name} pool index {index} out of range ({})", pool.len()),
        };

        match resource {
            ResourceType::InMv => targets.motion_vectors,
            ResourceType::InNormalRoughness => targets.normal_roughness,
            ResourceType::InViewZ => targets.view_space_z,
            ResourceType::InDiffRadianceHitDist => targets.in_diff_radiance_hit_dist,
            ResourceType::InSpecRadianceHitDist => targets.in_spec_radiance_hit_dist,
            ResourceType::OutDiffRadianceHitDist => targets.out_diff_radiance_hit_dist,
            ResourceType::OutSpecRadianceHitDist => targets.out_spec_radiance_hit_dist,
            ResourceType::TransientPool(index) => pooled(&self.transient_textures, index, "transient"),
            ResourceType::PermanentPool(index) => pooled(&self.permanent_textures, index, "permanent"),
            other => panic!("unavailable denoiser resource type {other:?}"),
        }
    }
}

#[inline]
fn binding_type(descriptor_type: DescriptorType) -> GfxBindingType {
    match descriptor_type {
        DescriptorType::Texture => GfxBindingType::TextureSrv,
        DescriptorType::StorageTexture => GfxBindingType::TextureUav,
    }
}

/// 由当前帧和上一帧的视图构造引擎的公共设置
///
/// 运动矢量是屏幕空间的像素偏移，scale 取 viewport 的倒数。
pub fn build_common_settings(inputs: &NrdFrameInputs) -> CommonSettings {
    let viewport = inputs.view.viewport();
    let viewport_prev = inputs.view_prev.viewport();
    let size = [viewport.x as u32, viewport.y as u32];
    let size_prev = [viewport_prev.x as u32, viewport_prev.y as u32];

    CommonSettings {
        world_to_view_matrix: inputs.view.view_matrix().to_cols_array(),
        world_to_view_matrix_prev: inputs.view_prev.view_matrix().to_cols_array(),
        view_to_clip_matrix: inputs.view.projection_matrix().to_cols_array(),
        view_to_clip_matrix_prev: inputs.view_prev.projection_matrix().to_cols_array(),

        motion_vector_scale: [1.0 / viewport.x, 1.0 / viewport.y, 1.0],
        camera_jitter: inputs.view.pixel_offset().to_array(),
        camera_jitter_prev: inputs.view_prev.pixel_offset().to_array(),
        resource_size: size,
        resource_size_prev: size_prev,
        rect_size: size,
        rect_size_prev: size_prev,

        frame_index: inputs.frame_index,
        is_motion_vector_in_world_space: false,
        enable_validation: inputs.enable_validation,
        disocclusion_threshold: inputs.disocclusion.threshold,
        disocclusion_threshold_alternate: inputs.disocclusion.alternate,
        is_disocclusion_threshold_mix_available: inputs.disocclusion.use_alternate_mix,
        accumulation_mode: if inputs.reset { AccumulationMode::Restart } else { AccumulationMode::Continue },
    }
}
