use clap::{ArgAction, Args};

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Host of the store when running inside the container network.
pub const DOCKER_HOST: &str = "redis";
pub const LOCAL_HOST: &str = "localhost";

/// How to reach the backing store. Every flag falls back to an environment variable.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Config {
    /// Port the store listens on
    #[arg(short, long, env = "REDIS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Password sent with AUTH right after connecting
    #[arg(long, env = "REDIS_PASSWORD")]
    pub password: Option<String>,

    /// Whether the process runs in the container network (`yes`) or next to the store
    #[arg(
        long,
        env = "docker",
        action = ArgAction::Set,
        value_parser = parse_docker_flag,
        default_value = "no"
    )]
    pub docker: bool,

    /// Replies larger than this are rejected as a protocol error
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Config {
    pub fn host(&self) -> &'static str {
        if self.docker {
            DOCKER_HOST
        } else {
            LOCAL_HOST
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            password: None,
            docker: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

fn parse_docker_flag(value: &str) -> Result<bool, String> {
    Ok(value == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["adachi-kv"]).unwrap();

        assert_eq!(cli.config.port, DEFAULT_PORT);
        assert_eq!(cli.config.host(), LOCAL_HOST);
        assert_eq!(cli.config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn docker_flag_selects_container_host() {
        let cli = Cli::try_parse_from(["adachi-kv", "--docker", "yes", "--port", "6380"]).unwrap();

        assert_eq!(cli.config.address(), "redis:6380");
    }

    #[test]
    fn anything_but_yes_means_local() {
        let cli = Cli::try_parse_from(["adachi-kv", "--docker", "true"]).unwrap();

        assert_eq!(cli.config.host(), LOCAL_HOST);
    }

    #[test]
    fn password_is_optional() {
        let cli = Cli::try_parse_from(["adachi-kv", "--password", "secret"]).unwrap();

        assert_eq!(cli.config.password.as_deref(), Some("secret"));
        assert_eq!(Config::default().password, None);
    }
}
