//! Configuration operations - validation, loading and overrides

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use super::configuration_data::PhysicsConfiguration;
use crate::error::{PhysicsError, PhysicsResult};

/// Validate configuration parameters
pub fn validate(config: &PhysicsConfiguration) -> Result<()> {
    let bounds = &config.world_bounds;
    for axis in 0..3 {
        let (min, max) = (bounds.min[axis], bounds.max[axis]);
        if !min.is_finite() || !max.is_finite() {
            return Err(anyhow!(
                "PhysicsConfiguration: world bounds must be finite (axis {})",
                axis
            ));
        }
        if min >= max {
            return Err(anyhow!(
                "PhysicsConfiguration: world bounds inverted on axis {} ({} >= {})",
                axis,
                min,
                max
            ));
        }
    }

    let vdb = &config.visual_debugger;
    if vdb.enable && vdb.port == 0 {
        return Err(anyhow!(
            "PhysicsConfiguration: visual debugger enabled without a port"
        ));
    }
    if vdb.timer_bytes_per_thread == 0 {
        return Err(anyhow!(
            "PhysicsConfiguration: timer_bytes_per_thread cannot be 0"
        ));
    }

    if config.solver.default_iterations == 0 {
        return Err(anyhow!(
            "PhysicsConfiguration: solver.default_iterations cannot be 0"
        ));
    }
    if !(config.solver.collision_tolerance >= 0.0) {
        return Err(anyhow!(
            "PhysicsConfiguration: collision_tolerance {} must be >= 0",
            config.solver.collision_tolerance
        ));
    }

    log::info!(
        "[PhysicsConfiguration] Validated: sleeping={}, welding_tags={:#04x}, vdb={} (port {})",
        config.enable_sleeping,
        config.body_tags_for_contact_welding,
        vdb.enable,
        vdb.port
    );
    Ok(())
}

/// Parse a TOML document; missing fields take their defaults
pub fn parse_toml(source: &str) -> Result<PhysicsConfiguration> {
    let config: PhysicsConfiguration =
        toml::from_str(source).context("PhysicsConfiguration: invalid TOML")?;
    validate(&config)?;
    Ok(config)
}

/// Load and validate a TOML configuration file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<PhysicsConfiguration> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("PhysicsConfiguration: reading {}", path.display()))?;
    parse_toml(&source).with_context(|| format!("PhysicsConfiguration: parsing {}", path.display()))
}

/// Apply one backend-style `key = value` override
pub fn apply_override(config: &mut PhysicsConfiguration, key: &str, value: &str) -> PhysicsResult<()> {
    let value = value.trim();
    match key {
        "enable_sleeping" => config.enable_sleeping = parse_bool(key, value)?,
        "contact_welding_tags" => config.body_tags_for_contact_welding = parse_value(key, value)?,
        "vdb.enable" => config.visual_debugger.enable = parse_bool(key, value)?,
        "vdb.port" => config.visual_debugger.port = parse_value(key, value)?,
        "vdb.timer_buffer_size" => {
            config.visual_debugger.timer_bytes_per_thread = parse_value(key, value)?
        }
        "world_bounds.min" => config.world_bounds.min = parse_vector(key, value)?,
        "world_bounds.max" => config.world_bounds.max = parse_vector(key, value)?,
        "solver.iterations" => config.solver.default_iterations = parse_value(key, value)?,
        _ => {
            log::warn!("[PhysicsConfiguration] Unknown configuration key '{}'", key);
            return Err(invalid(key, value, "unknown key"));
        }
    }

    log::info!("[PhysicsConfiguration] {} = {}", key, value);
    Ok(())
}

fn invalid(key: &str, value: &str, reason: &str) -> PhysicsError {
    PhysicsError::InvalidConfig {
        field: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(key: &str, value: &str) -> PhysicsResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> PhysicsResult<T> {
    value
        .parse::<T>()
        .map_err(|_| invalid(key, value, "not a valid number"))
}

fn parse_vector(key: &str, value: &str) -> PhysicsResult<[f32; 3]> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(invalid(key, value, "expected three comma separated components"));
    }
    let mut out = [0.0f32; 3];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = parse_value(key, part)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PhysicsConfiguration::default();
        assert!(validate(&config).is_ok());
        assert!(config.enable_sleeping);
        assert_eq!(config.visual_debugger.port, 25001);
        assert_eq!(config.world_bounds.min, [-5000.0; 3]);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = PhysicsConfiguration::default();
        config.world_bounds.min[1] = 10.0;
        config.world_bounds.max[1] = -10.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = parse_toml(
            r#"
            enable_sleeping = false
            body_tags_for_contact_welding = 3

            [visual_debugger]
            enable = true
            port = 4000
            "#,
        )
        .expect("valid toml");

        assert!(!config.enable_sleeping);
        assert_eq!(config.body_tags_for_contact_welding, 3);
        assert!(config.visual_debugger.enable);
        assert_eq!(config.visual_debugger.port, 4000);
        assert_eq!(config.solver.default_iterations, 4);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[world_bounds]\nmin = [-10.0, -10.0, -10.0]\nmax = [10.0, 10.0, 10.0]")
            .expect("write");

        let config = load_from_file(file.path()).expect("load");
        assert_eq!(config.world_bounds.max, [10.0; 3]);
    }

    #[test]
    fn test_apply_override() {
        let mut config = PhysicsConfiguration::default();
        apply_override(&mut config, "vdb.enable", "true").expect("bool");
        apply_override(&mut config, "vdb.port", "7000").expect("port");
        apply_override(&mut config, "world_bounds.min", "-1, -2, -3").expect("vector");

        assert!(config.visual_debugger.enable);
        assert_eq!(config.visual_debugger.port, 7000);
        assert_eq!(config.world_bounds.min, [-1.0, -2.0, -3.0]);

        assert!(matches!(
            apply_override(&mut config, "gravity", "0"),
            Err(PhysicsError::InvalidConfig { .. })
        ));
        assert!(apply_override(&mut config, "vdb.port", "seventy").is_err());
    }
}
