//! Backend registration and device opening
//!
//! A backend string is a name optionally followed by `key=value` options,
//! e.g. `dummy` or `ft232h:i2c_khz=100,interface=A`.

use ftbridge_dummy::DummyTransport;
use ftbridge_ft232h::{parse_options, Ft232h};

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
    /// Whether this build can open it
    pub available: bool,
}

/// Errors raised while selecting and opening a backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Name matches no backend
    #[error("Unknown backend: {0}\n\n{help}", help = backend_help())]
    Unknown(String),
    /// Backend exists but was compiled out
    #[error("Backend '{name}' requires the `{feature}` feature")]
    Disabled {
        /// Backend name
        name: &'static str,
        /// Cargo feature that enables it
        feature: &'static str,
    },
    /// Option parsing or device open failed
    #[error(transparent)]
    Device(#[from] ftbridge_core::Error),
}

/// Every backend known to this build
pub fn backends() -> Vec<BackendInfo> {
    vec![
        BackendInfo {
            name: "dummy",
            aliases: &[],
            description: "In-memory MPSSE emulator for testing",
            available: true,
        },
        BackendInfo {
            name: "ft232h",
            aliases: &["ftdi", "libftdi"],
            description: "FT232H through libftdi1 (vid=<hex>,pid=<hex>,interface=<A-D>,i2c_khz=<N>)",
            available: cfg!(feature = "libftdi"),
        },
    ]
}

/// Help text listing all backends
pub fn backend_help() -> String {
    let mut help = String::from("Available backends:\n");
    for b in backends() {
        let status = if b.available {
            ""
        } else {
            " [not compiled in]"
        };
        help.push_str(&format!("  {:10} - {}{}\n", b.name, b.description, status));
    }
    help
}

/// Short list of backend names for CLI help
pub fn backend_names_short() -> String {
    let names: Vec<&str> = backends().iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Split `name:opt=val,opt=val` into its name and option pairs
pub fn parse_backend_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn find_backend(name: &str) -> Option<BackendInfo> {
    backends()
        .into_iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
}

/// Open the device described by `backend`
pub fn open_device(backend: &str) -> Result<Ft232h, BackendError> {
    let (name, options) = parse_backend_string(backend);
    let info = find_backend(name).ok_or_else(|| BackendError::Unknown(name.to_string()))?;
    let config = parse_options(&options)?;

    log::debug!("Opening backend '{}' with {} option(s)", info.name, options.len());

    match info.name {
        "dummy" => Ok(Ft232h::new(DummyTransport::new(), config)),
        #[cfg(feature = "libftdi")]
        "ft232h" => Ok(Ft232h::open(config)?),
        name => Err(BackendError::Disabled {
            name,
            feature: "libftdi",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_string() {
        assert_eq!(parse_backend_string("dummy"), ("dummy", vec![]));
        assert_eq!(
            parse_backend_string("ft232h:i2c_khz=100,interface=B"),
            ("ft232h", vec![("i2c_khz", "100"), ("interface", "B")])
        );
        // Options without a value are dropped
        assert_eq!(
            parse_backend_string("ft232h:bogus,timeout_ms=5"),
            ("ft232h", vec![("timeout_ms", "5")])
        );
    }

    #[test]
    fn test_aliases() {
        assert_eq!(find_backend("ftdi").map(|b| b.name), Some("ft232h"));
        assert!(find_backend("ch341a").is_none());
    }

    #[test]
    fn test_open_dummy() {
        let device = open_device("dummy:description=bench").unwrap();
        assert_eq!(device.config().name(), "bench");
        assert!(matches!(
            open_device("nope"),
            Err(BackendError::Unknown(_))
        ));
        assert!(matches!(
            open_device("dummy:i2c_khz=0"),
            Err(BackendError::Device(_))
        ));
    }
}
