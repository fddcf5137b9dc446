//! Evaluator configuration.

use std::fmt;
use std::time::Duration;

use rumqttc::MqttOptions;

/// Configuration for [`crate::Evaluator::new`].
#[derive(Clone)]
pub struct Config {
    /// Toplevel name used when the evaluator acts as a server on the bus.
    pub toplevel: String,

    /// Geographic position for sun timers, in degrees.
    pub latitude: f64,
    pub longitude: f64,

    /// Connect only as a client: no connected markers, no command handling.
    pub client_only: bool,

    /// Broker connection options, passed through opaquely.
    pub mqtt: MqttOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toplevel: "jim".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            client_only: false,
            mqtt: default_mqtt_options(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("toplevel", &self.toplevel)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("client_only", &self.client_only)
            .finish_non_exhaustive()
    }
}

/// Local broker, 5-second keep-alive.
pub fn default_mqtt_options() -> MqttOptions {
    let mut options = MqttOptions::new("jim", "localhost", 1883);
    options.set_keep_alive(Duration::from_secs(5));
    options
}
