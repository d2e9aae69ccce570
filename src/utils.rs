use rand::RngCore;

/// Generates a random token of size N bytes, encoded in base58.
pub fn generate_token<const N: usize>(mut rng: impl RngCore) -> eyre::Result<String> {
    let mut token = [0u8; N];
    rng.try_fill_bytes(&mut token)?;
    Ok(bs58::encode(token).into_string())
}

/// Correlation id attached to the log lines of one scheduled run.
pub fn trace_id() -> String {
    generate_token::<8>(rand::thread_rng()).unwrap_or_else(|_| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_base58_and_distinct() {
        let a = trace_id();
        let b = trace_id();

        assert_ne!(a, b);
        assert!(bs58::decode(&a).into_vec().is_ok_and(|bytes| bytes.len() == 8));
    }
}
