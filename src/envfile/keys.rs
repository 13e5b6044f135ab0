//! The closed set of recognized `.env` keys
//!
//! Order here is prompt order and file order.

/// Where an interactive default comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    /// No default; empty input leaves the value empty.
    None,
    Value(&'static str),
    /// A fresh random secret, generated per materialization.
    GeneratedSecret,
}

#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub name: &'static str,
    pub prompt: &'static str,
    pub group: &'static str,
    pub required: bool,
    pub default: DefaultValue,
}

pub const KEYS: &[KeySpec] = &[
    KeySpec {
        name: "OPENAI_API_KEY",
        prompt: "OpenAI API key",
        group: "AI providers",
        required: true,
        default: DefaultValue::None,
    },
    KeySpec {
        name: "GEMINI_API_KEY",
        prompt: "Gemini API key",
        group: "AI providers",
        required: true,
        default: DefaultValue::None,
    },
    KeySpec {
        name: "ANTHROPIC_API_KEY",
        prompt: "Anthropic API key (optional)",
        group: "AI providers",
        required: false,
        default: DefaultValue::Value(""),
    },
    KeySpec {
        name: "GITHUB_TOKEN",
        prompt: "GitHub token (optional)",
        group: "GitHub",
        required: false,
        default: DefaultValue::Value(""),
    },
    KeySpec {
        name: "GITHUB_WEBHOOK_SECRET",
        prompt: "GitHub webhook secret (optional)",
        group: "GitHub",
        required: false,
        default: DefaultValue::Value(""),
    },
    KeySpec {
        name: "POSTGRES_DB",
        prompt: "PostgreSQL database name",
        group: "Database",
        required: false,
        default: DefaultValue::Value("dasy"),
    },
    KeySpec {
        name: "POSTGRES_USER",
        prompt: "PostgreSQL user",
        group: "Database",
        required: false,
        default: DefaultValue::Value("dasy"),
    },
    KeySpec {
        name: "POSTGRES_PASSWORD",
        prompt: "PostgreSQL password",
        group: "Database",
        required: false,
        default: DefaultValue::Value("dasy_password"),
    },
    KeySpec {
        name: "POSTGRES_PORT",
        prompt: "PostgreSQL port",
        group: "Database",
        required: false,
        default: DefaultValue::Value("5432"),
    },
    KeySpec {
        name: "RABBITMQ_DEFAULT_USER",
        prompt: "RabbitMQ user",
        group: "Message broker",
        required: false,
        default: DefaultValue::Value("dasy"),
    },
    KeySpec {
        name: "RABBITMQ_DEFAULT_PASS",
        prompt: "RabbitMQ password",
        group: "Message broker",
        required: false,
        default: DefaultValue::Value("dasy_password"),
    },
    KeySpec {
        name: "RABBITMQ_PORT",
        prompt: "RabbitMQ AMQP port",
        group: "Message broker",
        required: false,
        default: DefaultValue::Value("5672"),
    },
    KeySpec {
        name: "RABBITMQ_MANAGEMENT_PORT",
        prompt: "RabbitMQ management UI port",
        group: "Message broker",
        required: false,
        default: DefaultValue::Value("15672"),
    },
    KeySpec {
        name: "ORCHESTRATOR_PORT",
        prompt: "Orchestrator HTTP port",
        group: "Orchestrator",
        required: false,
        default: DefaultValue::Value("8000"),
    },
    KeySpec {
        name: "JWT_SECRET",
        prompt: "JWT signing secret",
        group: "Orchestrator",
        required: false,
        default: DefaultValue::GeneratedSecret,
    },
    KeySpec {
        name: "CLOUDFLARE_TUNNEL_TOKEN",
        prompt: "Cloudflare tunnel token (optional)",
        group: "Tunnel",
        required: false,
        default: DefaultValue::Value(""),
    },
];

/// Keys that must hold a real value before the stack is started.
pub fn required_keys() -> impl Iterator<Item = &'static str> {
    KEYS.iter().filter(|k| k.required).map(|k| k.name)
}

pub fn lookup(name: &str) -> Option<&'static KeySpec> {
    KEYS.iter().find(|k| k.name == name)
}

/// Sentinel written by the template: `OPENAI_API_KEY` -> `your_openai_api_key_here`.
pub fn placeholder(key: &str) -> String {
    format!("your_{}_here", key.to_lowercase())
}

/// Closest recognized key for a probable typo, if any is close enough.
pub fn suggest(unknown: &str) -> Option<&'static str> {
    let upper = unknown.to_uppercase();
    KEYS.iter()
        .map(|k| (k.name, strsim::jaro_winkler(&upper, k.name)))
        .filter(|(_, score)| *score >= 0.88)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name)
}

/// 64 hex characters from two v4 UUIDs.
pub fn generate_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}
