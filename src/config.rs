use std::path::{Path, PathBuf};

pub const DEFAULT_MAP_WIDTH: i32 = 6144;
pub const DEFAULT_MAP_HEIGHT: i32 = 4096;
pub const DEFAULT_TERRAIN_CACHE: usize = 64;

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub root: PathBuf,
    pub map_width: i32,
    pub map_height: i32,
    pub terrain_cache: usize,
}

impl WorldConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err(
                "usage: avalon <data-root> [map_width] [map_height] [terrain_cache]".to_string(),
            );
        }

        let root = Path::new(&args[1]).to_path_buf();
        let map_width = if args.len() > 2 {
            parse_dimension(&args[2], "map_width")?
        } else {
            env_dimension("AVALON_MAP_WIDTH")?.unwrap_or(DEFAULT_MAP_WIDTH)
        };
        let map_height = if args.len() > 3 {
            parse_dimension(&args[3], "map_height")?
        } else {
            env_dimension("AVALON_MAP_HEIGHT")?.unwrap_or(DEFAULT_MAP_HEIGHT)
        };
        let terrain_cache = if args.len() > 4 {
            args[4]
                .parse::<usize>()
                .map_err(|err| format!("terrain_cache: {}", err))?
        } else {
            match std::env::var("AVALON_TERRAIN_CACHE") {
                Ok(value) if !value.trim().is_empty() => value
                    .trim()
                    .parse::<usize>()
                    .map_err(|err| format!("AVALON_TERRAIN_CACHE: {}", err))?,
                _ => DEFAULT_TERRAIN_CACHE,
            }
        };
        if terrain_cache == 0 {
            return Err("terrain_cache must be at least 1".to_string());
        }

        Ok(Self {
            root,
            map_width,
            map_height,
            terrain_cache,
        })
    }

    /// Config with default dimensions, rooted at the given data directory.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
            terrain_cache: DEFAULT_TERRAIN_CACHE,
        }
    }
}

fn parse_dimension(value: &str, name: &str) -> Result<i32, String> {
    let parsed = value
        .parse::<i32>()
        .map_err(|err| format!("{}: {}", name, err))?;
    if parsed <= 0 {
        return Err(format!("{} must be positive, got {}", name, parsed));
    }
    Ok(parsed)
}

fn env_dimension(var: &str) -> Result<Option<i32>, String> {
    match std::env::var(var) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            parse_dimension(trimmed, var).map(Some)
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(WorldConfig::from_args(&args(&["avalon"])).is_err());
    }

    #[test]
    fn defaults_apply_when_only_root_given() {
        let config = WorldConfig::from_args(&args(&["avalon", "/tmp/world"])).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/world"));
        assert_eq!(config.map_width, DEFAULT_MAP_WIDTH);
        assert_eq!(config.map_height, DEFAULT_MAP_HEIGHT);
        assert_eq!(config.terrain_cache, DEFAULT_TERRAIN_CACHE);
    }

    #[test]
    fn explicit_dimensions_override_defaults() {
        let config =
            WorldConfig::from_args(&args(&["avalon", "/tmp/world", "1024", "768", "16"])).unwrap();
        assert_eq!(config.map_width, 1024);
        assert_eq!(config.map_height, 768);
        assert_eq!(config.terrain_cache, 16);
    }

    #[test]
    fn rejects_nonpositive_dimensions() {
        assert!(WorldConfig::from_args(&args(&["avalon", "/tmp/world", "0"])).is_err());
        assert!(WorldConfig::from_args(&args(&["avalon", "/tmp/world", "-5"])).is_err());
    }
}
