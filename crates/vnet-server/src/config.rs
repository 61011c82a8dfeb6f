// config.rs — command-line configuration
//
// The original engine's `Server/main.cpp` hardcodes a bind port and never
// parses argv at all. This core is meant to run against more than one map,
// so it grows a small positional-plus-flags surface; no argument-parsing
// crate is pulled in, matching the rest of this workspace's ambient stack.

use std::path::PathBuf;

use vnet_common::error::{NetError, NetResult};

pub const DEFAULT_PORT: u16 = 6666;
pub const DEFAULT_TICK_RATE_HZ: f64 = 66.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub map_name: String,
    pub port: u16,
    pub bsp_path: Option<PathBuf>,
    pub tick_rate_hz: f64,
    pub show_errors_to_clients: bool,
}

impl Config {
    /// Parse a positional map name followed by `--port`, `--bsp`,
    /// `--tick-rate`, and `--show-errors` flags.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> NetResult<Config> {
        let mut map_name = None;
        let mut port = DEFAULT_PORT;
        let mut bsp_path = None;
        let mut tick_rate_hz = DEFAULT_TICK_RATE_HZ;
        let mut show_errors_to_clients = true;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let value = next_value(&mut iter, "--port")?;
                    port = value.parse().map_err(|_| NetError::Decode(format!("invalid --port value {value}")))?;
                }
                "--bsp" => {
                    bsp_path = Some(PathBuf::from(next_value(&mut iter, "--bsp")?));
                }
                "--tick-rate" => {
                    let value = next_value(&mut iter, "--tick-rate")?;
                    tick_rate_hz =
                        value.parse().map_err(|_| NetError::Decode(format!("invalid --tick-rate value {value}")))?;
                }
                "--show-errors" => {
                    let value = next_value(&mut iter, "--show-errors")?;
                    show_errors_to_clients =
                        value.parse().map_err(|_| NetError::Decode(format!("invalid --show-errors value {value}")))?;
                }
                positional if map_name.is_none() => map_name = Some(positional.to_string()),
                other => return Err(NetError::Decode(format!("unrecognized argument {other}"))),
            }
        }

        Ok(Config {
            map_name: map_name.ok_or_else(|| NetError::Decode("missing required map name argument".into()))?,
            port,
            bsp_path,
            tick_rate_hz,
            show_errors_to_clients,
        })
    }
}

fn next_value<I: Iterator<Item = String>>(iter: &mut I, flag: &str) -> NetResult<String> {
    iter.next().ok_or_else(|| NetError::Decode(format!("{flag} requires a value")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_map_name_only() {
        let config = Config::parse(args("de_dust2")).unwrap();
        assert_eq!(config.map_name, "de_dust2");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.tick_rate_hz, DEFAULT_TICK_RATE_HZ);
        assert!(config.show_errors_to_clients);
        assert!(config.bsp_path.is_none());
    }

    #[test]
    fn parses_all_flags() {
        let config = Config::parse(args(
            "ctf_2fort --port 27015 --bsp maps/ctf_2fort.bsp --tick-rate 33 --show-errors false",
        ))
        .unwrap();
        assert_eq!(config.map_name, "ctf_2fort");
        assert_eq!(config.port, 27015);
        assert_eq!(config.bsp_path, Some(PathBuf::from("maps/ctf_2fort.bsp")));
        assert_eq!(config.tick_rate_hz, 33.0);
        assert!(!config.show_errors_to_clients);
    }

    #[test]
    fn show_errors_to_clients_defaults_to_true() {
        let config = Config::parse(args("de_dust2")).unwrap();
        assert!(config.show_errors_to_clients);
    }

    #[test]
    fn missing_map_name_is_an_error() {
        assert!(matches!(Config::parse(args("--port 1234")), Err(NetError::Decode(_))));
    }

    #[test]
    fn unrecognized_flag_is_an_error() {
        assert!(matches!(Config::parse(args("de_dust2 --bogus")), Err(NetError::Decode(_))));
    }

    #[test]
    fn dangling_flag_without_value_is_an_error() {
        assert!(matches!(Config::parse(args("de_dust2 --port")), Err(NetError::Decode(_))));
    }
}
