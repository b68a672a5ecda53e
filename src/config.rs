//! Renderer configuration
//!
//! [`RendererConfig`] follows the same builder style as the pipeline configuration:
//! start from [`RendererConfig::default()`] and chain `with_*` calls, or overlay
//! values from the environment with [`RendererConfig::from_env()`].

use crate::error::ConfigError;

/// Default near clip plane in scene distance units
pub const Z_NEAR: f32 = 0.01;
/// Default far clip plane in scene distance units
pub const Z_FAR: f32 = 100.0;
/// Default number of instance uniform slots reserved per frame
pub const DEFAULT_MAX_INSTANCES: usize = 256;
/// Default number of pooled uniform buffers before the pool warns about growth
pub const DEFAULT_POOL_SOFT_LIMIT: usize = 8;

/// Settings for [`SceneRenderer`](crate::gfx::rendering::SceneRenderer) and the wgpu backend
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Near clip plane used when deriving the projection from tracking intrinsics
    pub z_near: f32,
    /// Far clip plane used when deriving the projection from tracking intrinsics
    pub z_far: f32,
    /// Initial instance slot capacity of each per-frame uniform buffer
    pub max_instances: usize,
    /// Pooled buffer count above which growth is reported with a warning
    pub pool_soft_limit: usize,
    /// Clear color behind the camera feed (visible only when no video frame is present)
    pub clear_color: [f64; 4],
    /// Synchronize presentation with the display refresh
    pub vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            z_near: Z_NEAR,
            z_far: Z_FAR,
            max_instances: DEFAULT_MAX_INSTANCES,
            pool_soft_limit: DEFAULT_POOL_SOFT_LIMIT,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
        }
    }
}

impl RendererConfig {
    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.z_near = near;
        self.z_far = far;
        self
    }

    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances;
        self
    }

    pub fn with_pool_soft_limit(mut self, limit: usize) -> Self {
        self.pool_soft_limit = limit;
        self
    }

    pub fn with_clear_color(mut self, color: [f64; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Checks invariants the renderer relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.z_near > 0.0 && self.z_near < self.z_far) {
            return Err(ConfigError::InvalidClipPlanes {
                near: self.z_near,
                far: self.z_far,
            });
        }
        if self.max_instances == 0 {
            return Err(ConfigError::ZeroInstanceCapacity);
        }
        Ok(())
    }

    /// Default configuration overlaid with `ARSCENE_*` environment variables
    ///
    /// Recognized variables: `ARSCENE_Z_NEAR`, `ARSCENE_Z_FAR`, `ARSCENE_MAX_INSTANCES`,
    /// `ARSCENE_POOL_SOFT_LIMIT` and `ARSCENE_VSYNC` (`0`/`1`/`true`/`false`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = parse_var::<f32, _>(&lookup, "ARSCENE_Z_NEAR")? {
            config.z_near = value;
        }
        if let Some(value) = parse_var::<f32, _>(&lookup, "ARSCENE_Z_FAR")? {
            config.z_far = value;
        }
        if let Some(value) = parse_var::<usize, _>(&lookup, "ARSCENE_MAX_INSTANCES")? {
            config.max_instances = value;
        }
        if let Some(value) = parse_var::<usize, _>(&lookup, "ARSCENE_POOL_SOFT_LIMIT")? {
            config.pool_soft_limit = value;
        }
        if let Some(raw) = lookup("ARSCENE_VSYNC") {
            config.vsync = match raw.trim() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        name: "ARSCENE_VSYNC",
                        value: raw,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue { name, value: raw }),
    }
}
