//! Subscription descriptor served to the sidecar's discovery probe.

use pipeline_config::Config;
use pipeline_types::Subscription;

/// Topics this process consumes and the local route each is delivered to.
///
/// Derived once from configuration; nothing changes at runtime.
pub fn subscriptions(config: &Config) -> Vec<Subscription> {
	vec![Subscription::new(
		&config.broker.channel(),
		&config.processor.route,
	)]
}
