// camera.rs — 截图相机参数（视场角 / 宽高比 / 朝向）

use glam::{EulerRot, Quat};

/// 把截图侧记录的欧拉角（度，x=俯仰 y=偏航 z=滚转）转成四元数。
/// 组合顺序为内旋 Y·X·Z，与截图采集端的旋转约定一致。
pub fn euler_rotation_deg(ex: f32, ey: f32, ez: f32) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        ey.to_radians(),
        ex.to_radians(),
        ez.to_radians(),
    )
}

/// 拍摄 patch 时刻的相机状态。投影时只读。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParameters {
    /// 垂直视场角（弧度），有效范围 (0, π)
    pub vfov: f32,
    /// 宽高比 = 宽 / 高，必须 > 0
    pub aspect: f32,
    /// 相机局部系 → 世界系的旋转
    pub orientation: Quat,
}

impl CameraParameters {
    pub fn new(vfov: f32, aspect: f32, orientation: Quat) -> Self {
        Self {
            vfov,
            aspect,
            orientation,
        }
    }

    pub fn from_euler_deg(ex: f32, ey: f32, ez: f32, vfov_deg: f32, aspect: f32) -> Self {
        Self::new(
            vfov_deg.to_radians(),
            aspect,
            euler_rotation_deg(ex, ey, ez),
        )
    }

    /// 校验不变量：vfov ∈ (0, π)，aspect > 0，且都为有限值
    pub fn is_valid(&self) -> bool {
        self.vfov.is_finite()
            && self.vfov > 0.0
            && self.vfov < std::f32::consts::PI
            && self.aspect.is_finite()
            && self.aspect > 0.0
    }

    pub fn tan_half_vfov(&self) -> f32 {
        (self.vfov / 2.0).tan()
    }

    /// 水平视场角（弧度）：hfov = 2·atan(tan(vfov/2)·aspect)
    pub fn hfov(&self) -> f32 {
        2.0 * (self.tan_half_vfov() * self.aspect).atan()
    }
}
