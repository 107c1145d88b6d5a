//! Environment-derived controller configuration.
//!
//! All flags are read exactly once at startup into a [`Config`] value that
//! is handed to the reconciler; the engine itself never touches the
//! environment, so reconciliation stays deterministic and testable.

use crate::error::ControllerError;
use std::env;
use std::time::Duration;

/// Default Istio gateway the generated route is attached to.
pub const DEFAULT_ROUTING_GATEWAY: &str = "theia-system/theia-gateway";

/// Default idle window before an instance is culled, in minutes.
pub const DEFAULT_CULL_IDLE_MINUTES: u64 = 1440;

/// Default interval between idleness re-checks, in minutes.
pub const DEFAULT_IDLENESS_CHECK_MINUTES: u64 = 1;

/// Controller configuration, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// `USE_ROUTING`: manage a VirtualService per instance (default off).
    pub use_routing: bool,
    /// `ROUTING_GATEWAY`: gateway the route is attached to.
    pub routing_gateway: String,
    /// `ADD_FSGROUP`: inject a default pod security context (default on).
    /// Some platforms (e.g. OpenShift) need this off so their own policy
    /// controller can choose the fsGroup.
    pub add_fsgroup: bool,
    /// `CULL_IDLE_TIME`: idle window before culling, in minutes.
    pub cull_idle_time: Duration,
    /// `IDLENESS_CHECK_PERIOD`: requeue interval for idleness re-checks,
    /// in minutes.
    pub idleness_check_period: Duration,
    /// `WATCH_NAMESPACE`: namespace the controller operates in.
    pub watch_namespace: String,
    /// `METRICS_ADDR`: bind address for the /metrics and /healthz server.
    pub metrics_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_routing: false,
            routing_gateway: DEFAULT_ROUTING_GATEWAY.to_string(),
            add_fsgroup: true,
            cull_idle_time: Duration::from_secs(DEFAULT_CULL_IDLE_MINUTES * 60),
            idleness_check_period: Duration::from_secs(DEFAULT_IDLENESS_CHECK_MINUTES * 60),
            watch_namespace: "default".to_string(),
            metrics_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, applying defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ControllerError> {
        let defaults = Self::default();
        Ok(Self {
            use_routing: flag_enabled(env::var("USE_ROUTING").ok().as_deref(), false),
            routing_gateway: env::var("ROUTING_GATEWAY")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.routing_gateway),
            add_fsgroup: flag_enabled(env::var("ADD_FSGROUP").ok().as_deref(), true),
            cull_idle_time: parse_minutes("CULL_IDLE_TIME", env::var("CULL_IDLE_TIME").ok())?
                .unwrap_or(defaults.cull_idle_time),
            idleness_check_period: parse_minutes(
                "IDLENESS_CHECK_PERIOD",
                env::var("IDLENESS_CHECK_PERIOD").ok(),
            )?
            .unwrap_or(defaults.idleness_check_period),
            watch_namespace: env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.watch_namespace),
            metrics_addr: env::var("METRICS_ADDR")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.metrics_addr),
        })
    }
}

/// Boolean flag semantics: an unset variable takes the default, any set
/// value counts as enabled only when it equals `"true"`.
fn flag_enabled(value: Option<&str>, default: bool) -> bool {
    match value {
        None => default,
        Some(v) => v == "true",
    }
}

fn parse_minutes(name: &str, value: Option<String>) -> Result<Option<Duration>, ControllerError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let minutes: u64 = raw.parse().map_err(|_| {
        ControllerError::InvalidConfig(format!("{name} must be a number of minutes, got '{raw}'"))
    })?;
    Ok(Some(Duration::from_secs(minutes * 60)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_semantics_match_legacy_behavior() {
        // ADD_FSGROUP defaults on, is disabled by any non-"true" value
        assert!(flag_enabled(None, true));
        assert!(flag_enabled(Some("true"), true));
        assert!(!flag_enabled(Some("false"), true));
        assert!(!flag_enabled(Some("1"), true));

        // USE_ROUTING defaults off
        assert!(!flag_enabled(None, false));
        assert!(flag_enabled(Some("true"), false));
    }

    #[test]
    fn minutes_parse_and_reject_garbage() {
        let parsed = parse_minutes("CULL_IDLE_TIME", Some("90".to_string()))
            .expect("valid minutes")
            .expect("value present");
        assert_eq!(parsed, Duration::from_secs(90 * 60));

        assert!(parse_minutes("CULL_IDLE_TIME", Some("soon".to_string())).is_err());
        assert!(
            parse_minutes("CULL_IDLE_TIME", None)
                .expect("absent is fine")
                .is_none()
        );
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(!cfg.use_routing);
        assert!(cfg.add_fsgroup);
        assert_eq!(cfg.routing_gateway, DEFAULT_ROUTING_GATEWAY);
        assert_eq!(cfg.cull_idle_time, Duration::from_secs(86_400));
        assert_eq!(cfg.idleness_check_period, Duration::from_secs(60));
    }
}
