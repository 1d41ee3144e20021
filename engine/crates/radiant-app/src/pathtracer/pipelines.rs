//! 光追与 compute pipeline 的变体
//!
//! 光追 pipeline 的全局 binding 槽位固定为 [`BindingSlot::ALL`]，变体只决定每个槽位
//! 使用真实 layout 还是空 layout。变体按 shader 宏组合懒创建，之后一直复用。

use std::collections::HashMap;

use radiant_gfx::binding::{GfxBindingLayoutDesc, GfxBindingSetDesc, GfxBindingType, GfxShaderStages};
use radiant_gfx::device::{GfxDevice, GfxShaderCompiler};
use radiant_gfx::handles::{
    GfxBindingLayoutHandle, GfxBindingSetHandle, GfxComputePipelineHandle, GfxRtPipelineHandle,
};
use radiant_gfx::pipeline::{
    GfxComputePipelineDesc, GfxRtHitGroup, GfxRtPipelineDesc, GfxShaderDesc, GfxShaderLibraryDesc, GfxShaderMacro,
};
use radiant_nrc::buffers::NrcBufferHandles;
use radiant_nrd::render_targets::RenderTargets;
use radiant_render_interface::binding_slots::{BindingSlot, BindingSlots};

pub const PATHTRACER_LIBRARY: &str = "pathtracer/Pathtracer.hlsl";
pub const SHARC_SHADER: &str = "pathtracer/SharcResolve.hlsl";
pub const DENOISER_SHADER: &str = "pathtracer/DenoiserNrd.hlsl";

const MAX_PAYLOAD_SIZE: u32 = 64;

/// 一次光追 dispatch 的用途
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RtPass {
    Reference,
    NrcQuery,
    NrcUpdate,
    SharcUpdate,
    SharcQuery,
}
impl RtPass {
    /// 同时作为 marker 名称和 hazard tracker 中的 dispatch 名称
    pub fn name(self) -> &'static str {
        match self {
            RtPass::Reference => "reference",
            RtPass::NrcQuery => "nrc-query",
            RtPass::NrcUpdate => "nrc-update",
            RtPass::SharcUpdate => "sharc-update",
            RtPass::SharcQuery => "sharc-query",
        }
    }

    fn cache_slot(self) -> Option<BindingSlot> {
        match self {
            RtPass::Reference => None,
            RtPass::NrcQuery | RtPass::NrcUpdate => Some(BindingSlot::NeuralCache),
            RtPass::SharcUpdate | RtPass::SharcQuery => Some(BindingSlot::SpatialCache),
        }
    }
}

/// 光追 pipeline 的变体
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RtPipelineKey {
    pub pass: RtPass,
    /// 是否写入降噪器的输入
    pub denoiser: bool,
}
impl RtPipelineKey {
    pub fn macros(&self) -> Vec<GfxShaderMacro> {
        vec![
            GfxShaderMacro::flag("REFERENCE", self.pass == RtPass::Reference),
            GfxShaderMacro::flag("NRC_QUERY", self.pass == RtPass::NrcQuery),
            GfxShaderMacro::flag("NRC_UPDATE", self.pass == RtPass::NrcUpdate),
            GfxShaderMacro::flag("SHARC_UPDATE", self.pass == RtPass::SharcUpdate),
            GfxShaderMacro::flag("SHARC_QUERY", self.pass == RtPass::SharcQuery),
            GfxShaderMacro::flag("ENABLE_NRD", self.denoiser),
        ]
    }

    /// 这个变体需要的槽位
    pub fn active_slots(&self) -> Vec<BindingSlot> {
        let mut slots = vec![BindingSlot::Globals, BindingSlot::Bindless];
        if self.denoiser {
            slots.push(BindingSlot::Denoiser);
        }
        slots.extend(self.pass.cache_slot());
        slots
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComputeKind {
    SharcResolve,
    SharcCompaction,
    /// `nrc`：NRC 同时开启时 shader 会多打包几个通道，绑定不变
    DenoiserPack { nrc: bool },
    DenoiserResolve,
}
impl ComputeKind {
    pub fn name(self) -> &'static str {
        match self {
            ComputeKind::SharcResolve => "sharc-resolve",
            ComputeKind::SharcCompaction => "sharc-compaction",
            ComputeKind::DenoiserPack { .. } => "nrd-pack",
            ComputeKind::DenoiserResolve => "nrd-resolve",
        }
    }

    fn shader_desc(self) -> GfxShaderDesc {
        match self {
            ComputeKind::SharcResolve => GfxShaderDesc::compute(SHARC_SHADER, "sharcResolve", Vec::new()),
            ComputeKind::SharcCompaction => GfxShaderDesc::compute(SHARC_SHADER, "sharcCompaction", Vec::new()),
            ComputeKind::DenoiserPack { nrc } => GfxShaderDesc::compute(
                DENOISER_SHADER,
                "reblurPackData",
                vec![GfxShaderMacro::flag("NRC_ENABLED", nrc)],
            ),
            ComputeKind::DenoiserResolve => GfxShaderDesc::compute(DENOISER_SHADER, "reblurResolve", Vec::new()),
        }
    }

    fn slots(self) -> Vec<BindingSlot> {
        match self {
            ComputeKind::SharcResolve | ComputeKind::SharcCompaction => {
                vec![BindingSlot::Globals, BindingSlot::SpatialCache]
            }
            ComputeKind::DenoiserPack { .. } | ComputeKind::DenoiserResolve => {
                vec![BindingSlot::Globals, BindingSlot::Denoiser]
            }
        }
    }
}

/// Globals 槽：b0 光照常量，b1 全局常量，t0 TLAS，t1-t3 场景 buffer，s0 sampler，u0 输出
pub fn globals_layout_desc() -> GfxBindingLayoutDesc {
    GfxBindingLayoutDesc::new(GfxShaderStages::ALL, BindingSlot::Globals.register_space(), "Globals")
        .item(0, GfxBindingType::VolatileConstantBuffer)
        .item(1, GfxBindingType::VolatileConstantBuffer)
        .item(0, GfxBindingType::AccelStruct)
        .item(1, GfxBindingType::StructuredBufferSrv)
        .item(2, GfxBindingType::StructuredBufferSrv)
        .item(3, GfxBindingType::StructuredBufferSrv)
        .item(0, GfxBindingType::Sampler)
        .item(0, GfxBindingType::TextureUav)
}

/// SpatialCache 槽：hash entries、copy offset、当前与上一帧的 voxel 数据
pub fn sharc_layout_desc() -> GfxBindingLayoutDesc {
    (0..4).fold(
        GfxBindingLayoutDesc::new(
            GfxShaderStages::RAY_TRACING | GfxShaderStages::COMPUTE,
            BindingSlot::SpatialCache.register_space(),
            "SHARC",
        ),
        |desc, slot| desc.item(slot, GfxBindingType::StructuredBufferUav),
    )
}

pub struct PathtracerPipelines {
    layouts: BindingSlots<GfxBindingLayoutHandle>,
    empty_layouts: [GfxBindingLayoutHandle; BindingSlot::COUNT],
    empty_sets: [GfxBindingSetHandle; BindingSlot::COUNT],

    rt_pipelines: HashMap<RtPipelineKey, GfxRtPipelineHandle>,
    compute_pipelines: HashMap<ComputeKind, GfxComputePipelineHandle>,
}
// new & init
impl PathtracerPipelines {
    pub fn new(device: &mut dyn GfxDevice, bindless_layout: GfxBindingLayoutHandle) -> anyhow::Result<Self> {
        let layouts = BindingSlots::new()
            .with(BindingSlot::Globals, device.create_binding_layout(&globals_layout_desc())?)
            .with(
                BindingSlot::Denoiser,
                device.create_binding_layout(&RenderTargets::binding_layout_desc(
                    BindingSlot::Denoiser.register_space(),
                ))?,
            )
            .with(
                BindingSlot::NeuralCache,
                device.create_binding_layout(&NrcBufferHandles::binding_layout_desc(
                    BindingSlot::NeuralCache.register_space(),
                ))?,
            )
            .with(BindingSlot::SpatialCache, device.create_binding_layout(&sharc_layout_desc())?)
            .with(BindingSlot::Bindless, bindless_layout);

        let mut empty_layouts = [GfxBindingLayoutHandle::default(); BindingSlot::COUNT];
        let mut empty_sets = [GfxBindingSetHandle::default(); BindingSlot::COUNT];
        for slot in BindingSlot::ALL {
            let layout = device.create_binding_layout(&GfxBindingLayoutDesc::new(
                GfxShaderStages::ALL,
                slot.register_space(),
                format!("Empty {slot}"),
            ))?;
            empty_layouts[slot.index()] = layout;
            empty_sets[slot.index()] = device.create_binding_set(&GfxBindingSetDesc::default(), layout)?;
        }

        Ok(Self {
            layouts,
            empty_layouts,
            empty_sets,
            rt_pipelines: HashMap::new(),
            compute_pipelines: HashMap::new(),
        })
    }
}
// getters
impl PathtracerPipelines {
    /// 槽位上的真实 layout
    pub fn layout(&self, slot: BindingSlot) -> GfxBindingLayoutHandle {
        match self.layouts.get(slot) {
            Some(layout) => layout,
            None => self.empty_layouts[slot.index()],
        }
    }

    #[inline]
    pub fn empty_layout(&self, slot: BindingSlot) -> GfxBindingLayoutHandle {
        self.empty_layouts[slot.index()]
    }

    /// 按槽位顺序展开 binding set，未激活的槽位使用空 set
    pub fn resolve_sets(&self, sets: &BindingSlots<GfxBindingSetHandle>) -> Vec<GfxBindingSetHandle> {
        sets.resolve(&self.empty_sets)
    }

    /// compute pipeline 只绑定自己用到的槽位，顺序与 [`ComputeKind`] 的声明一致
    pub fn compute_sets(&self, kind: ComputeKind, sets: &BindingSlots<GfxBindingSetHandle>) -> Vec<GfxBindingSetHandle> {
        kind.slots()
            .into_iter()
            .map(|slot| sets.get(slot).unwrap_or(self.empty_sets[slot.index()]))
            .collect()
    }

    pub fn rt_pipeline_count(&self) -> usize {
        self.rt_pipelines.len()
    }
}
// tools
impl PathtracerPipelines {
    pub fn slot_layouts(&self, key: &RtPipelineKey) -> BindingSlots<GfxBindingLayoutHandle> {
        key.active_slots()
            .into_iter()
            .fold(BindingSlots::new(), |slots, slot| slots.with(slot, self.layout(slot)))
    }

    pub fn rt_pipeline(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        key: RtPipelineKey,
    ) -> anyhow::Result<GfxRtPipelineHandle> {
        if let Some(pipeline) = self.rt_pipelines.get(&key) {
            return Ok(*pipeline);
        }

        let library = compiler.compile_library(&GfxShaderLibraryDesc {
            source: PATHTRACER_LIBRARY.to_string(),
            macros: key.macros(),
        })?;
        let pipeline = device.create_rt_pipeline(&GfxRtPipelineDesc {
            library,
            ray_gen: "RayGen".to_string(),
            miss_shaders: vec!["Miss".to_string(), "ShadowMiss".to_string()],
            hit_groups: vec![GfxRtHitGroup {
                name: "HitGroup".to_string(),
                closest_hit: "ClosestHit".to_string(),
                any_hit: Some("AnyHit".to_string()),
            }],
            global_binding_layouts: self.slot_layouts(&key).resolve(&self.empty_layouts),
            max_payload_size: MAX_PAYLOAD_SIZE,
            debug_name: format!("Pathtracer {}{}", key.pass.name(), if key.denoiser { " + NRD" } else { "" }),
        })?;
        log::info!("created ray tracing pipeline variant {key:?}");

        self.rt_pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    pub fn compute_pipeline(
        &mut self,
        device: &mut dyn GfxDevice,
        compiler: &mut dyn GfxShaderCompiler,
        kind: ComputeKind,
    ) -> anyhow::Result<GfxComputePipelineHandle> {
        if let Some(pipeline) = self.compute_pipelines.get(&kind) {
            return Ok(*pipeline);
        }

        let shader = compiler.compile_shader(&kind.shader_desc())?;
        let pipeline = device.create_compute_pipeline(&GfxComputePipelineDesc {
            shader,
            binding_layouts: kind.slots().into_iter().map(|slot| self.layout(slot)).collect(),
            debug_name: kind.name().to_string(),
        })?;

        self.compute_pipelines.insert(kind, pipeline);
        Ok(pipeline)
    }
}
// destroy
impl PathtracerPipelines {
    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        for (_, pipeline) in self.rt_pipelines.drain() {
            device.destroy_rt_pipeline(pipeline);
        }
        for (_, pipeline) in self.compute_pipelines.drain() {
            device.destroy_compute_pipeline(pipeline);
        }
        for set in self.empty_sets {
            device.destroy_binding_set(set);
        }
        for layout in self.empty_layouts {
            device.destroy_binding_layout(layout);
        }
        // Bindless 的 layout 属于场景
        for slot in BindingSlot::ALL.into_iter().filter(|slot| *slot != BindingSlot::Bindless) {
            if let Some(layout) = self.layouts.get(slot) {
                device.destroy_binding_layout(layout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use radiant_gfx::device::GraphicsApi;
    use radiant_gfx::headless::{HeadlessDevice, HeadlessShaderCompiler};

    use super::*;

    #[test]
    fn test_rt_variants_keep_slot_count() {
        let mut device = HeadlessDevice::new(GraphicsApi::D3d12);
        let mut compiler = HeadlessShaderCompiler::new();
        let bindless = device
            .create_binding_layout(&GfxBindingLayoutDesc::new(GfxShaderStages::ALL, 4, "Bindless"))
            .unwrap();
        let mut pipelines = PathtracerPipelines::new(&mut device, bindless).unwrap();

        let reference = RtPipelineKey {
            pass: RtPass::Reference,
            denoiser: false,
        };
        let sharc = RtPipelineKey {
            pass: RtPass::SharcQuery,
            denoiser: true,
        };
        let a = pipelines.rt_pipeline(&mut device, &mut compiler, reference).unwrap();
        let b = pipelines.rt_pipeline(&mut device, &mut compiler, sharc).unwrap();
        assert_eq!(pipelines.rt_pipeline(&mut device, &mut compiler, reference).unwrap(), a);
        assert_eq!(compiler.compiled_library_count(), 2);

        let reference_layouts = &device.rt_pipeline_desc(a).unwrap().global_binding_layouts;
        let sharc_layouts = &device.rt_pipeline_desc(b).unwrap().global_binding_layouts;
        assert_eq!(reference_layouts.len(), BindingSlot::COUNT);
        assert_eq!(sharc_layouts.len(), BindingSlot::COUNT);

        let spatial = BindingSlot::SpatialCache.index();
        assert_eq!(reference_layouts[spatial], pipelines.empty_layout(BindingSlot::SpatialCache));
        assert_eq!(sharc_layouts[spatial], pipelines.layout(BindingSlot::SpatialCache));
        assert_eq!(sharc_layouts[BindingSlot::Denoiser.index()], pipelines.layout(BindingSlot::Denoiser));
        assert_eq!(sharc_layouts[BindingSlot::Bindless.index()], bindless);
    }

    #[test]
    fn test_variant_macros() {
        let key = RtPipelineKey {
            pass: RtPass::NrcUpdate,
            denoiser: false,
        };
        let enabled = key.macros().into_iter().filter(|m| m.value == "1").map(|m| m.name).collect::<Vec<_>>();
        assert_eq!(enabled, vec!["NRC_UPDATE".to_string()]);
        assert!(!key.active_slots().contains(&BindingSlot::Denoiser));
        assert!(key.active_slots().contains(&BindingSlot::NeuralCache));
    }
}
