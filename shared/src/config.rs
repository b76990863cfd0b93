use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct KafkaArgs {
    /// Comma-separated broker addresses.
    #[arg(long, env = "KAFKA_BROKERS", value_parser = parse_brokers)]
    pub kafka_brokers: String,

    /// Outbox poll interval in milliseconds.
    #[arg(long, env = "OUTBOX_POLL_MS", default_value_t = 400)]
    pub outbox_poll_ms: u64,
}

/// Normalises a comma-separated broker list, dropping blanks.
pub fn parse_brokers(raw: &str) -> Result<String, String> {
    let brokers: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect();

    if brokers.is_empty() {
        return Err("KAFKA_BROKERS is empty".to_owned());
    }
    Ok(brokers.join(","))
}
