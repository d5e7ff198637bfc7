//! Host details passed to environment setup.

use serde_json::{Value, json};

/// Operating system and architecture of the machine the agent runs on.
pub fn os_info() -> Value {
    json!({
        "os": std::env::consts::OS,
        "family": std::env::consts::FAMILY,
        "arch": std::env::consts::ARCH,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_current_platform() {
        let info = os_info();
        assert_eq!(info["os"], std::env::consts::OS);
        assert!(info["arch"].as_str().is_some_and(|arch| !arch.is_empty()));
    }
}
