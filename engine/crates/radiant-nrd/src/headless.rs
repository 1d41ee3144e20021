//! 用于测试和离屏演示的降噪引擎
//!
//! 声明一组与 REBLUR 形状相同的需求（两个 sampler、三个 pass、两个纹理池），
//! 每帧按固定顺序给出三个 dispatch。调用记录写入共享的 [`HeadlessDenoiserProbe`]。

use std::sync::{Arc, Mutex};

use crate::engine::{
    CommonSettings, DenoiserEngine, DenoiserMethod, DescriptorType, DispatchDesc, InstanceDesc, PipelineDesc,
    PoolTextureDesc, ReblurSettings, ResourceRangeDesc, ResourceType, SamplerMode,
};
use crate::error::NrdError;
use crate::format::Format;

#[derive(Debug, Default)]
pub struct HeadlessDenoiserProbe {
    pub instances_created: usize,
    pub instances_destroyed: usize,
    pub method_settings_calls: usize,
    pub common_settings: Vec<CommonSettings>,
}

pub struct HeadlessDenoiserEngine {
    desc: InstanceDesc,
    fail_creation: bool,
    injected_resource: Option<ResourceType>,
    common: Option<CommonSettings>,
    probe: Arc<Mutex<HeadlessDenoiserProbe>>,
}

const GROUP_SIZE: u32 = 8;

fn range(descriptor_type: DescriptorType, descriptors_num: u32) -> ResourceRangeDesc {
    ResourceRangeDesc {
        descriptor_type,
        base_register_index: 0,
        descriptors_num,
    }
}

fn pipeline(file: &str, srv: u32, uav: u32) -> PipelineDesc {
    PipelineDesc {
        shader_file_name: file.to_string(),
        shader_entry_point: "main".to_string(),
        resource_ranges: vec![range(DescriptorType::Texture, srv), range(DescriptorType::StorageTexture, uav)],
    }
}

// new & init
impl HeadlessDenoiserEngine {
    pub fn new() -> Self {
        Self {
            desc: InstanceDesc {
                constant_buffer_max_data_size: 64,
                constant_buffer_register_index: 0,
                samplers_space_index: 0,
                samplers_base_register_index: 0,
                samplers: vec![SamplerMode::NearestClamp, SamplerMode::LinearClamp],
                pipelines: vec![
                    pipeline("REBLUR_DiffuseSpecular_PrePass.cs.hlsl", 4, 2),
                    pipeline("REBLUR_DiffuseSpecular_TemporalAccumulation.cs.hlsl", 3, 2),
                    pipeline("REBLUR_DiffuseSpecular_Blur.cs.hlsl", 2, 2),
                ],
                permanent_pool: vec![
                    PoolTextureDesc {
                        format: Format::RGBA16_SFLOAT,
                    },
                    PoolTextureDesc {
                        format: Format::RGBA16_SFLOAT,
                    },
                ],
                transient_pool: vec![
                    PoolTextureDesc {
                        format: Format::RGBA16_SFLOAT,
                    },
                    PoolTextureDesc {
                        format: Format::R16_SFLOAT,
                    },
                ],
            },
            fail_creation: false,
            injected_resource: None,
            common: None,
            probe: Arc::new(Mutex::new(HeadlessDenoiserProbe::default())),
        }
    }

    pub fn with_sampler(mut self, mode: SamplerMode) -> Self {
        self.desc.samplers.push(mode);
        self
    }

    pub fn with_permanent_format(mut self, format: Format) -> Self {
        self.desc.permanent_pool.push(PoolTextureDesc { format });
        self
    }

    pub fn failing_creation(mut self) -> Self {
        self.fail_creation = true;
        self
    }

    /// 把第一个 dispatch 的第一个资源替换掉，用于模拟引擎版本不匹配
    pub fn with_injected_resource(mut self, resource: ResourceType) -> Self {
        self.injected_resource = Some(resource);
        self
    }

    pub fn probe(&self) -> Arc<Mutex<HeadlessDenoiserProbe>> {
        self.probe.clone()
    }
}
impl Default for HeadlessDenoiserEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDenoiserEngine {
    fn with_probe(&self, f: impl FnOnce(&mut HeadlessDenoiserProbe)) {
        if let Ok(mut probe) = self.probe.lock() {
            f(&mut probe);
        }
    }

    fn constant_data(common: &CommonSettings, pass: u32) -> Vec<u8> {
        [common.frame_index, pass, common.rect_size[0], common.rect_size[1]]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }
}

impl DenoiserEngine for HeadlessDenoiserEngine {
    fn create_instance(&mut self, method: DenoiserMethod) -> Result<(), NrdError> {
        if self.fail_creation {
            return Err(NrdError::InstanceCreation(format!("{method:?} is not available")));
        }
        self.with_probe(|p| p.instances_created += 1);
        Ok(())
    }

    fn destroy_instance(&mut self) {
        self.with_probe(|p| p.instances_destroyed += 1);
    }

    fn describe_requirements(&self) -> &InstanceDesc {
        &self.desc
    }

    fn set_method_settings(&mut self, _settings: &ReblurSettings) {
        self.with_probe(|p| p.method_settings_calls += 1);
    }

    fn set_common_settings(&mut self, settings: &CommonSettings) {
        self.common = Some(settings.clone());
        self.with_probe(|p| p.common_settings.push(settings.clone()));
    }

    fn compute_dispatches(&mut self) -> Vec<DispatchDesc> {
        let common = self.common.clone().unwrap_or_default();
        let grid_width = common.rect_size[0].div_ceil(GROUP_SIZE);
        let grid_height = common.rect_size[1].div_ceil(GROUP_SIZE);

        let passes: [(&str, Vec<ResourceType>); 3] = [
            (
                "REBLUR::PrePass",
                vec![
                    ResourceType::InNormalRoughness,
                    ResourceType::InViewZ,
                    ResourceType::InDiffRadianceHitDist,
                    ResourceType::InSpecRadianceHitDist,
                    ResourceType::TransientPool(0),
                    ResourceType::TransientPool(1),
                ],
            ),
            (
                "REBLUR::TemporalAccumulation",
                vec![
                    ResourceType::InMv,
                    ResourceType::TransientPool(0),
                    ResourceType::TransientPool(1),
                    ResourceType::PermanentPool(0),
                    ResourceType::PermanentPool(1),
                ],
            ),
            (
                "REBLUR::Blur",
                vec![
                    ResourceType::PermanentPool(0),
                    ResourceType::PermanentPool(1),
                    ResourceType::OutDiffRadianceHitDist,
                    ResourceType::OutSpecRadianceHitDist,
                ],
            ),
        ];

        let mut dispatches: Vec<DispatchDesc> = passes
            .into_iter()
            .enumerate()
            .map(|(index, (name, resources))| DispatchDesc {
                name: Some(name.to_string()),
                constant_buffer_data: Self::constant_data(&common, index as u32),
                resources,
                pipeline_index: index,
                grid_width,
                grid_height,
            })
            .collect();

        if let (Some(resource), Some(first)) = (self.injected_resource, dispatches.first_mut()) {
            first.resources[0] = resource;
        }
        dispatches
    }
}
