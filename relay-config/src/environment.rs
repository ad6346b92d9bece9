use std::fmt;
use std::io;

/// Environment variable that selects the runtime environment.
const ENVIRONMENT_ENV_VAR: &str = "RELAY_ENVIRONMENT";

/// Runtime environment the service is deployed in.
///
/// The environment selects which configuration overlay is loaded on top of
/// the base configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// Determines the environment from `RELAY_ENVIRONMENT`, defaulting to dev.
    pub fn load() -> Result<Self, io::Error> {
        match std::env::var(ENVIRONMENT_ENV_VAR) {
            Ok(value) => value.parse().map_err(|err: String| {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }),
            Err(std::env::VarError::NotPresent) => Ok(Environment::Dev),
            Err(err) => Err(io::Error::new(io::ErrorKind::InvalidInput, err)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => write!(f, "dev"),
            Environment::Staging => write!(f, "staging"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(format!(
                "`{other}` is not a valid environment, expected one of: dev, staging, prod"
            )),
        }
    }
}
