//! 离屏程序与测试使用的内置场景
//!
//! 地面、两个静态物体和一个蒙皮角色，外加太阳光与一盏点光源。

use glam::{Affine3A, Mat4, Quat, Vec3};

use radiant_gfx::binding::{GfxBindingLayoutDesc, GfxBindingSetDesc, GfxBindingSetItem, GfxBindingType, GfxShaderStages};
use radiant_gfx::device::GfxDevice;
use radiant_gfx::resources::GfxBufferDesc;
use radiant_render_interface::binding_slots::BindingSlot;
use radiant_render_interface::scene::{
    SceneBounds, SceneGeometry, SceneGpuBuffers, SceneGraph, SceneInstance, SceneLight, SceneMesh,
};

const INSTANCE_STRIDE: u32 = 64;
const GEOMETRY_STRIDE: u32 = 32;
const MATERIAL_STRIDE: u32 = 64;

pub struct DemoScene {
    meshes: Vec<SceneMesh>,
    instances: Vec<SceneInstance>,
    lights: Vec<SceneLight>,
    camera: Mat4,
    /// 蒙皮角色所在的实例
    animated_instance: usize,
    animation_time: f32,

    gpu: SceneGpuBuffers,
}
// new & init
impl DemoScene {
    pub fn new(device: &mut dyn GfxDevice) -> anyhow::Result<Self> {
        let quad = |name: &str, skinned: bool, triangles: u32| SceneMesh {
            name: name.to_string(),
            skinned,
            geometries: vec![SceneGeometry {
                index_count: triangles * 3,
                vertex_count: triangles + 2,
                opaque: true,
            }],
        };
        let meshes = vec![
            quad("floor", false, 2),
            SceneMesh {
                // 叶片需要 any-hit 做 alpha test
                geometries: vec![
                    SceneGeometry {
                        index_count: 3000,
                        vertex_count: 1200,
                        opaque: true,
                    },
                    SceneGeometry {
                        index_count: 600,
                        vertex_count: 400,
                        opaque: false,
                    },
                ],
                ..quad("plant", false, 0)
            },
            quad("statue", false, 4000),
            quad("character", true, 6000),
        ];

        let instances = vec![
            SceneInstance {
                mesh_index: 0,
                transform: Affine3A::from_scale(Vec3::new(20.0, 1.0, 20.0)),
            },
            SceneInstance {
                mesh_index: 1,
                transform: Affine3A::from_translation(Vec3::new(-3.0, 0.0, 1.0)),
            },
            SceneInstance {
                mesh_index: 2,
                transform: Affine3A::from_translation(Vec3::new(2.5, 0.0, -1.0)),
            },
            SceneInstance {
                mesh_index: 3,
                transform: Affine3A::IDENTITY,
            },
        ];

        let lights = vec![
            SceneLight::directional("sun", Vec3::new(-0.3, -0.9, 0.3), 20.0, 0.8),
            SceneLight::point("lamp", Vec3::new(0.0, 3.0, 2.0), 50.0, 0.1),
        ];

        let gpu = Self::create_gpu_buffers(device, &instances, &meshes)?;

        Ok(Self {
            meshes,
            instances,
            lights,
            camera: Mat4::look_at_rh(Vec3::new(0.0, 2.0, 8.0), Vec3::new(0.0, 1.0, 0.0), Vec3::Y),
            animated_instance: 3,
            animation_time: 0.0,
            gpu,
        })
    }

    fn create_gpu_buffers(
        device: &mut dyn GfxDevice,
        instances: &[SceneInstance],
        meshes: &[SceneMesh],
    ) -> anyhow::Result<SceneGpuBuffers> {
        let structured = |count: usize, stride: u32, name: &str| GfxBufferDesc {
            byte_size: count.max(1) as u64 * stride as u64,
            struct_stride: stride,
            debug_name: name.to_string(),
            ..Default::default()
        };
        let geometry_count = meshes.iter().map(|mesh| mesh.geometries.len()).sum();

        let instance_buffer = device.create_buffer(&structured(instances.len(), INSTANCE_STRIDE, "Instances"))?;
        let geometry_buffer = device.create_buffer(&structured(geometry_count, GEOMETRY_STRIDE, "Geometry"))?;
        let material_buffer = device.create_buffer(&structured(meshes.len(), MATERIAL_STRIDE, "Materials"))?;

        let bindless_layout = device.create_binding_layout(
            &GfxBindingLayoutDesc::new(
                GfxShaderStages::ALL,
                BindingSlot::Bindless.register_space(),
                "Bindless",
            )
            .item(0, GfxBindingType::StructuredBufferSrv),
        )?;
        let bindless_set = device.create_binding_set(
            &GfxBindingSetDesc::new(vec![GfxBindingSetItem::structured_buffer_srv(0, geometry_buffer)]),
            bindless_layout,
        )?;

        Ok(SceneGpuBuffers {
            instances: instance_buffer,
            geometries: geometry_buffer,
            materials: material_buffer,
            bindless_layout,
            bindless_set,
        })
    }
}
// update
impl DemoScene {
    pub fn set_camera(&mut self, camera: Mat4) {
        self.camera = camera;
    }

    /// 去掉所有方向光，帧编排会改用默认的太阳参数
    pub fn remove_directional_lights(&mut self) {
        self.lights.retain(|light| light.kind != radiant_render_interface::scene::LightKind::Directional);
    }
}
impl SceneGraph for DemoScene {
    fn meshes(&self) -> &[SceneMesh] {
        &self.meshes
    }

    fn instances(&self) -> &[SceneInstance] {
        &self.instances
    }

    fn lights(&self) -> &[SceneLight] {
        &self.lights
    }

    fn bounds(&self) -> SceneBounds {
        SceneBounds {
            min: Vec3::new(-20.0, -0.5, -20.0),
            max: Vec3::new(20.0, 6.0, 20.0),
        }
    }

    fn camera_view(&self) -> Mat4 {
        self.camera
    }

    fn gpu_buffers(&self) -> SceneGpuBuffers {
        self.gpu
    }

    fn refresh(&mut self, frame_index: u64) {
        self.animation_time = frame_index as f32 / 60.0;
        let rotation = Quat::from_rotation_y(self.animation_time);
        self.instances[self.animated_instance].transform = Affine3A::from_quat(rotation);
    }
}
