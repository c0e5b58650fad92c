use crate::cli::actions::Action;
use anyhow::{Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .context("missing required argument: --dsn")?,
        base_url: matches
            .get_one("base-url")
            .map(|s: &String| s.to_string())
            .context("missing required argument: --base-url")?,
        session_key: matches
            .get_one("session-key")
            .map(|s: &String| SecretString::from(s.to_string()))
            .context("missing required argument: --session-key")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_the_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "parola",
            "--dsn",
            "postgres://localhost/parola",
            "--session-key",
            "c2VjcmV0",
        ]);
        let action = handler(&matches).expect("action");
        let Action::Server { port, dsn, .. } = action;
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/parola");
    }
}
