use actix_web::web::{self, JsonConfig};

use crate::error::Error;

pub mod health;
pub mod messages;

/// Registers every route of the service.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(messages::service()).service(health::service());
}

/// Body extraction settings; malformed JSON is answered with a 400 in the
/// service's error format.
pub fn json_config() -> JsonConfig {
    JsonConfig::default()
        .content_type_required(false)
        .error_handler(|err, _req| Error::invalid_parameter(err.to_string()).into())
}
