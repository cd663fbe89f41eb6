use crate::error::{Result, StartupError};
use clap::{Args, Parser};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Sender/recipient used when running without SMTP credentials.
const DRY_RUN_ADDRESS: &str = "rook@localhost";

/// Parse `.env` content into key/value pairs.
///
/// Values may contain spaces without quotes; surrounding single or double
/// quotes are stripped.
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Load environment variables from a `.env` file in the working directory.
///
/// Variables already present in the environment win.
pub fn load_dotenv() {
    let Ok(content) = fs::read_to_string(Path::new(".env")) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            // SAFETY: called from main before the async runtime starts any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// MQTT connection flags shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct MqttArgs {
    /// MQTT username
    #[arg(long, env = "MQTT_USERNAME", default_value = "foo")]
    pub username: String,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", default_value = "bar")]
    pub password: String,

    /// MQTT broker hostname
    #[arg(long, env = "MQTT_BROKER_HOST", default_value = "homeassistant.local")]
    pub mqtt_server: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_BROKER_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,
}

impl MqttArgs {
    /// Build the broker config; the client id is `<prefix>_<hostname>`.
    pub fn to_config(&self, client_prefix: &str) -> MqttConfig {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        MqttConfig {
            broker_host: self.mqtt_server.clone(),
            broker_port: self.mqtt_port,
            client_id: format!("{}_{}", client_prefix, hostname),
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "rook")]
#[command(about = "Send an e-mail whenever an MQTT motion sensor changes state")]
pub struct Cli {
    #[command(flatten)]
    pub mqtt: MqttArgs,

    /// Topic filter carrying motion sensor payloads
    #[arg(long, env = "MQTT_TOPIC", default_value = "mostert/motion/#")]
    pub topic: String,

    /// File containing the Gmail username
    #[arg(long, env = "GMAIL_USERNAME_FILE", default_value = "gmail_username.txt")]
    pub gmail_username_file: String,

    /// File containing the Gmail app password
    #[arg(long, env = "GMAIL_PASSWORD_FILE", default_value = "gmail_password.txt")]
    pub gmail_password_file: String,

    /// SMTP relay host (implicit TLS)
    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    /// Notification recipient (defaults to the SMTP username)
    #[arg(long, env = "NOTIFY_RECIPIENT")]
    pub recipient: Option<String>,

    /// Listen address for the status HTTP/WebSocket interface
    #[arg(long, env = "STATUS_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Seconds between WebSocket status snapshots
    #[arg(long, env = "STATUS_STREAM_INTERVAL", default_value_t = 2)]
    pub stream_interval_secs: u64,

    /// Log notifications instead of sending e-mail
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub topic: String,
    pub smtp: SmtpConfig,
    pub status: StatusConfig,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub listen: SocketAddr,
    pub stream_interval: Duration,
}

/// Read a single-value credentials file, trimming surrounding whitespace.
pub fn read_credential(path: &str) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|source| StartupError::CredentialsFile {
        path: path.to_string(),
        source,
    })?;

    let value = content.trim();
    if value.is_empty() {
        return Err(StartupError::EmptyCredential(path.to_string()));
    }
    Ok(value.to_string())
}

impl Config {
    /// Resolve parsed flags into the runtime configuration.
    ///
    /// Credentials files are mandatory unless `--dry-run` is set.
    pub fn load(cli: &Cli) -> Result<Self> {
        let (username, password) = match (
            read_credential(&cli.gmail_username_file),
            read_credential(&cli.gmail_password_file),
        ) {
            (Ok(username), Ok(password)) => (username, password),
            (Err(e), _) | (_, Err(e)) if !cli.dry_run => return Err(e),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Dry run without SMTP credentials: {}", e);
                (DRY_RUN_ADDRESS.to_string(), String::new())
            }
        };

        let listen = cli
            .listen
            .parse()
            .map_err(|_| StartupError::InvalidListenAddress(cli.listen.clone()))?;

        Ok(Self {
            mqtt: cli.mqtt.to_config("rook"),
            topic: cli.topic.clone(),
            smtp: SmtpConfig {
                host: cli.smtp_host.clone(),
                recipient: cli.recipient.clone().unwrap_or_else(|| username.clone()),
                username,
                password,
            },
            status: StatusConfig {
                listen,
                stream_interval: Duration::from_secs(cli.stream_interval_secs.max(1)),
            },
            dry_run: cli.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(format!("rook-{}-{}", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["rook"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_dotenv() {
        let vars = parse_dotenv(
            "# comment\n\nMQTT_BROKER_HOST=10.0.0.2\nDEVICE = Front Door \nQUOTED='a b'\nbroken\n",
        );
        assert_eq!(
            vars,
            vec![
                ("MQTT_BROKER_HOST".to_string(), "10.0.0.2".to_string()),
                ("DEVICE".to_string(), "Front Door".to_string()),
                ("QUOTED".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn test_credentials_are_trimmed() {
        let path = temp_file("trimmed", "  someone@gmail.com \n");
        assert_eq!(read_credential(&path).unwrap(), "someone@gmail.com");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_empty_credential_rejected() {
        let path = temp_file("empty", " \n");
        assert!(matches!(
            read_credential(&path),
            Err(StartupError::EmptyCredential(_))
        ));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_credentials_is_startup_error() {
        let cli = cli(&[
            "--gmail-username-file",
            "/nonexistent/rook/user.txt",
            "--gmail-password-file",
            "/nonexistent/rook/pass.txt",
        ]);
        assert!(matches!(
            Config::load(&cli),
            Err(StartupError::CredentialsFile { .. })
        ));
    }

    #[test]
    fn test_dry_run_tolerates_missing_credentials() {
        let cli = cli(&[
            "--gmail-username-file",
            "/nonexistent/rook/user.txt",
            "--dry-run",
            "--listen",
            "127.0.0.1:9000",
        ]);
        let config = Config::load(&cli).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.smtp.recipient, DRY_RUN_ADDRESS);
        assert_eq!(config.status.listen.port(), 9000);
        assert_eq!(config.status.stream_interval, Duration::from_secs(2));
        assert_eq!(config.topic, "mostert/motion/#");
        assert!(config.mqtt.client_id.starts_with("rook_"));
    }

    #[test]
    fn test_recipient_defaults_to_smtp_username() {
        let user = temp_file("user", "me@gmail.com\n");
        let pass = temp_file("pass", "app-password\n");
        let cli = cli(&["--gmail-username-file", &user, "--gmail-password-file", &pass]);

        let config = Config::load(&cli).unwrap();
        assert_eq!(config.smtp.username, "me@gmail.com");
        assert_eq!(config.smtp.password, "app-password");
        assert_eq!(config.smtp.recipient, "me@gmail.com");

        fs::remove_file(user).unwrap();
        fs::remove_file(pass).unwrap();
    }

    #[test]
    fn test_invalid_listen_address() {
        let cli = cli(&["--dry-run", "--listen", "not-an-address"]);
        assert!(matches!(
            Config::load(&cli),
            Err(StartupError::InvalidListenAddress(_))
        ));
    }
}
