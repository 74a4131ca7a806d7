use super::{types::Config, ConfigError, MailBackend};

/// Validate configuration
/// Currently validates:
/// - Worker pool and retry settings are non-zero
/// - Poll intervals and tier wait budgets are positive and consistent
/// - The HTTP mail backend has a relay configured
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let restore = &config.restore;

    if restore.worker_pool_size == 0 {
        return invalid("restore.worker_pool_size cannot be 0");
    }
    if restore.max_retry_attempts == 0 {
        return invalid("restore.max_retry_attempts cannot be 0");
    }
    if restore.base_poll_interval_ms == 0 {
        return invalid("restore.base_poll_interval_ms cannot be 0");
    }
    if restore.max_poll_interval_ms < restore.base_poll_interval_ms {
        return invalid("restore.max_poll_interval_ms must be >= base_poll_interval_ms");
    }
    if restore.retry_max_delay_ms < restore.retry_base_delay_ms {
        return invalid("restore.retry_max_delay_ms must be >= retry_base_delay_ms");
    }
    let budgets = &restore.tier_wait_budgets;
    if budgets.standard_ms == 0 || budgets.expedited_ms == 0 || budgets.bulk_ms == 0 {
        return invalid("restore.tier_wait_budgets entries cannot be 0");
    }
    if restore.restore_days == 0 {
        return invalid("restore.restore_days cannot be 0");
    }

    if config.mail.backend == MailBackend::Http && config.mail.http.is_none() {
        return invalid("mail.backend = \"http\" requires a [mail.http] section");
    }

    Ok(())
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}
