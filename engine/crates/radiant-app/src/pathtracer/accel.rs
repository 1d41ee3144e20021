//! 场景加速结构
//!
//! 静态网格的 BLAS 只构建一次，随后压缩；蒙皮网格的 BLAS 每帧重新构建。
//! TLAS 每帧根据实例的当前变换重建。

use ash::vk;
use itertools::Itertools;

use radiant_gfx::accel::{GfxBlasDesc, GfxBlasGeometry, GfxTlasDesc, GfxTlasInstance};
use radiant_gfx::commands::GfxCommandList;
use radiant_gfx::device::GfxDevice;
use radiant_gfx::handles::GfxAccelStructHandle;
use radiant_render_interface::scene::{SceneGraph, SceneMesh};

struct MeshBlas {
    handle: GfxAccelStructHandle,
    skinned: bool,
    built: bool,
}

#[derive(Default)]
pub struct SceneAccelStructures {
    /// 与场景网格一一对应，没有几何的网格为 `None`
    blases: Vec<Option<MeshBlas>>,
    tlas: Option<GfxAccelStructHandle>,
}
// new & init
impl SceneAccelStructures {
    /// 销毁旧的加速结构并按场景重新创建，调用前设备需要处于空闲状态
    pub fn recreate(&mut self, device: &mut dyn GfxDevice, scene: &dyn SceneGraph) -> anyhow::Result<()> {
        let _span = tracy_client::span!("recreate_accel_structures");
        self.destroy(device);

        for mesh in scene.meshes() {
            let blas = if mesh.geometries.is_empty() {
                None
            } else {
                Some(MeshBlas {
                    handle: device.create_blas(&Self::blas_desc(mesh))?,
                    skinned: mesh.skinned,
                    built: false,
                })
            };
            self.blases.push(blas);
        }

        self.tlas = Some(device.create_tlas(&GfxTlasDesc {
            max_instances: scene.instances().len().max(1),
            debug_name: "SceneTLAS".to_string(),
        })?);

        log::info!(
            "created {} BLAS ({} skinned) for {} instances",
            self.blases.iter().flatten().count(),
            self.blases.iter().flatten().filter(|blas| blas.skinned).count(),
            scene.instances().len()
        );
        Ok(())
    }

    fn blas_desc(mesh: &SceneMesh) -> GfxBlasDesc {
        let build_flags = if mesh.skinned {
            vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD
        } else {
            vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE
                | vk::BuildAccelerationStructureFlagsKHR::ALLOW_COMPACTION
        };
        GfxBlasDesc {
            geometries: mesh
                .geometries
                .iter()
                .map(|geometry| GfxBlasGeometry {
                    index_count: geometry.index_count,
                    vertex_count: geometry.vertex_count,
                    opaque: geometry.opaque,
                })
                .collect(),
            build_flags,
            debug_name: format!("BLAS {}", mesh.name),
        }
    }
}
// getters
impl SceneAccelStructures {
    #[inline]
    pub fn tlas(&self) -> Option<GfxAccelStructHandle> {
        self.tlas
    }
}
// update
impl SceneAccelStructures {
    /// 记录本帧的构建命令，返回构建的 BLAS 数量
    pub fn record_builds(&mut self, cmd: &mut GfxCommandList, scene: &dyn SceneGraph) -> usize {
        let _span = tracy_client::span!("build_accel_structures");
        let Some(tlas) = self.tlas else {
            return 0;
        };

        cmd.begin_marker("AccelStructures");

        let mut static_built = 0;
        let mut skinned_built = 0;
        for blas in self.blases.iter_mut().flatten() {
            if blas.skinned {
                cmd.build_blas(blas.handle);
                skinned_built += 1;
            } else if !blas.built {
                cmd.build_blas(blas.handle);
                blas.built = true;
                static_built += 1;
            }
        }
        if static_built > 0 {
            cmd.compact_blases();
        }

        // BUG instance_id 只有 24 位有效，实例过多时会溢出
        let instances = scene
            .instances()
            .iter()
            .enumerate()
            .filter_map(|(idx, instance)| {
                let blas = self.blases.get(instance.mesh_index)?.as_ref()?;
                Some(GfxTlasInstance {
                    blas: blas.handle,
                    instance_id: idx as u32,
                    mask: 0xFF,
                    transform: instance.transform,
                })
            })
            .collect_vec();
        cmd.build_tlas(tlas, instances);

        cmd.end_marker();
        static_built + skinned_built
    }
}
// destroy
impl SceneAccelStructures {
    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        for blas in self.blases.drain(..).flatten() {
            device.destroy_accel_struct(blas.handle);
        }
        if let Some(tlas) = self.tlas.take() {
            device.destroy_accel_struct(tlas);
        }
    }
}
