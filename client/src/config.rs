//! Client configuration with environment overrides

use std::env;
use std::str::FromStr;

use web_time::Duration;

use crate::grid::camera::DEFAULT_TWEEN_DURATION;
use crate::grid::momentum::SpringConfig;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:9200";

/// Smallest tile edge accepted, in world units. Keeps the tile count of a
/// fully zoomed-out viewport bounded.
pub const MIN_TILE_SIZE: f64 = 8.0;

/// Tuning for the grid engine
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    /// Edge length of one tile in world units
    pub tile_size: f64,
    /// Extra tiles rendered and fetched around the visible rectangle
    pub viewport_margin: i32,
    /// Slack (in tiles) when deciding a region is already loaded
    pub load_gap: i32,
    pub debounce: Duration,
    /// Age after which an unanswered fetch stops blocking its region
    pub loading_timeout: Duration,
    pub tween_duration: Duration,
    pub spring: SpringConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tile_size: 100.0,
            viewport_margin: 2,
            load_gap: 2,
            debounce: Duration::from_millis(300),
            loading_timeout: Duration::from_secs(10),
            tween_duration: DEFAULT_TWEEN_DURATION,
            spring: SpringConfig::default(),
        }
    }
}

impl GridConfig {
    /// Clamp values that would make a frame unbounded
    pub fn sanitized(self) -> Self {
        Self {
            tile_size: self.tile_size.max(MIN_TILE_SIZE),
            viewport_margin: self.viewport_margin.max(0),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the content API serving `/api/grid`
    pub api_base: String,
    /// Base URL of the image proxy serving `/api/image-proxy`
    pub proxy_base: String,
    pub user_agent: String,
    /// Upper bound on decoded thumbnail memory, in bytes
    pub thumbnail_budget: usize,
    pub grid: GridConfig,
}

impl ClientConfig {
    /// Read settings from the environment. On the web, where there is no
    /// process environment, the values baked in at compile time are used.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let grid = GridConfig {
            tile_size: env_var_parse("THIINGS_TILE_SIZE", defaults.grid.tile_size).max(MIN_TILE_SIZE),
            viewport_margin: env_var_parse("THIINGS_VIEWPORT_MARGIN", defaults.grid.viewport_margin)
                .max(0),
            ..defaults.grid
        };

        Self {
            api_base: env::var("THIINGS_API_URL")
                .ok()
                .or_else(|| option_env!("THIINGS_API_URL").map(str::to_string))
                .unwrap_or(defaults.api_base),
            proxy_base: env::var("THIINGS_PROXY_URL")
                .ok()
                .or_else(|| option_env!("THIINGS_PROXY_URL").map(str::to_string))
                .unwrap_or(defaults.proxy_base),
            grid,
            ..defaults
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_URL.to_string(),
            proxy_base: DEFAULT_PROXY_URL.to_string(),
            user_agent: format!("thiings/{}", env!("CARGO_PKG_VERSION")),
            thumbnail_budget: 96 * 1024 * 1024,
            grid: GridConfig::default(),
        }
    }
}

fn env_var_parse<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Ignoring invalid {}={:?}", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_tuning() {
        let config = GridConfig::default();
        assert_eq!(config.tile_size, 100.0);
        assert_eq!(config.load_gap, 2);
        assert_eq!(config.debounce, Duration::from_millis(300));
        assert_eq!(config.loading_timeout, Duration::from_secs(10));
        assert_eq!(config.spring, SpringConfig::default());
    }

    #[test]
    fn test_tile_size_has_a_floor() {
        let config = GridConfig {
            tile_size: 0.5,
            ..GridConfig::default()
        }
        .sanitized();
        assert_eq!(config.tile_size, MIN_TILE_SIZE);

        let config = GridConfig {
            tile_size: f64::NAN,
            ..GridConfig::default()
        }
        .sanitized();
        assert_eq!(config.tile_size, MIN_TILE_SIZE);
        assert_eq!(GridConfig::default().sanitized(), GridConfig::default());
    }

    #[test]
    fn test_unset_variable_falls_back() {
        assert_eq!(env_var_parse("THIINGS_TEST_UNSET_VARIABLE", 7), 7);
    }
}
