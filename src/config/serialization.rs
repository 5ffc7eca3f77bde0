//! Config serialization to TOML
//!
//! Single source of truth for the config file format. Secrets are never
//! written back out: client credentials are masked.

use super::Config;

/// Mask a secret for display: first 4 and last 4 characters for long values
pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Render a body override as a TOML value; `None` when it holds a JSON null
fn override_to_toml(value: &serde_json::Value) -> Option<String> {
    toml::Value::try_from(value).ok().map(|v| v.to_string())
}

impl Config {
    /// Render the configuration as TOML
    pub fn to_toml(&self) -> String {
        let mut out = String::new();
        out.push_str("# relayapi configuration\n");
        out.push_str("# Precedence: environment variables > this file > defaults\n\n");
        out.push_str(&format!("bind_addr = \"{}\"\n", self.bind_addr));

        out.push_str("\n[upstream]\n");
        out.push_str("# Wait for response headers, and max silence between streamed chunks\n");
        out.push_str(&format!("timeout_secs = {}\n", self.upstream.timeout_secs));
        out.push_str(&format!(
            "connect_timeout_secs = {}\n",
            self.upstream.connect_timeout_secs
        ));

        out.push_str("\n[stats]\n");
        out.push_str(&format!(
            "sample_interval_ms = {}\n",
            self.stats.sample_interval_ms
        ));
        out.push_str(&format!("window = {}\n", self.stats.window));
        out.push_str(&format!(
            "report_interval_secs = {}  # 0 disables the periodic summary\n",
            self.stats.report_interval_secs
        ));

        out.push_str("\n[logging]\n");
        out.push_str(&format!("level = \"{}\"\n", self.logging.level));
        out.push_str(&format!("file_enabled = {}\n", self.logging.file_enabled));
        out.push_str(&format!(
            "file_dir = {:?}\n",
            self.logging.file_dir.display().to_string()
        ));
        out.push_str(&format!(
            "file_rotation = \"{}\"  # hourly, daily, never\n",
            self.logging.file_rotation.as_str()
        ));
        out.push_str(&format!("file_prefix = \"{}\"\n", self.logging.file_prefix));

        out.push_str(&self.providers_to_toml());
        out.push_str(&self.clients_to_toml());
        out
    }

    /// Serialize providers HashMap to TOML sections
    pub(super) fn providers_to_toml(&self) -> String {
        if self.clients.providers.is_empty() {
            // Show example comments when no providers configured
            return r#"
# Built-in providers: openai, anthropic, deepseek, gemini, openrouter
# [providers.local]
# base_url = "http://127.0.0.1:11434/v1"
# name = "Local Ollama"
"#
            .to_string();
        }

        let mut output = String::from("\n");
        // Sort keys for deterministic output
        let mut keys: Vec<_> = self.clients.providers.keys().collect();
        keys.sort();

        for provider_id in keys {
            let provider = &self.clients.providers[provider_id];
            output.push_str(&format!("[providers.{}]\n", provider_id));
            output.push_str(&format!("base_url = \"{}\"\n", provider.base_url));
            if let Some(name) = &provider.name {
                output.push_str(&format!("name = \"{}\"\n", name));
            }
            output.push('\n');
        }
        output
    }

    /// Serialize clients HashMap to TOML sections (secrets masked)
    pub(super) fn clients_to_toml(&self) -> String {
        if self.clients.clients.is_empty() {
            return r#"
# [clients.dev-1]
# token = "token-the-caller-presents"
# name = "Dev Laptop"
# provider = "openai"           # References [providers.X] or a built-in
# api_key_env = "OPENAI_API_KEY"
# path_override = "v1/chat/completions"
# [clients.dev-1.body_overrides]
# model = "gpt-4o-mini"
"#
            .to_string();
        }

        let mut output = String::from("\n");
        let mut keys: Vec<_> = self.clients.clients.keys().collect();
        keys.sort();

        for client_id in keys {
            let client = &self.clients.clients[client_id];
            output.push_str(&format!("[clients.{}]\n", client_id));
            output.push_str(&format!("token = \"{}\"\n", mask_secret(&client.token)));
            if let Some(name) = &client.name {
                output.push_str(&format!("name = \"{}\"\n", name));
            }
            output.push_str(&format!("provider = \"{}\"\n", client.provider));
            if let Some(env_name) = &client.api_key_env {
                output.push_str(&format!("api_key_env = \"{}\"\n", env_name));
            }
            if let Some(key) = &client.api_key {
                output.push_str(&format!("api_key = \"{}\"\n", mask_secret(key)));
            }
            if let Some(path) = &client.path_override {
                output.push_str(&format!("path_override = \"{}\"\n", path));
            }
            if !client.body_overrides.is_empty() {
                output.push_str(&format!("[clients.{}.body_overrides]\n", client_id));
                let mut fields: Vec<_> = client.body_overrides.iter().collect();
                fields.sort_by(|a, b| a.0.cmp(b.0));
                for (field, value) in fields {
                    let line = match override_to_toml(value) {
                        Some(rendered) => format!("{} = {}\n", field, rendered),
                        None => format!("# {} = null (not representable)\n", field),
                    };
                    output.push_str(&line);
                }
            }
            output.push('\n');
        }
        output
    }
}
