use std::sync::Arc;

use smart_default::SmartDefault;

use crate::buffer_pool::{BufferPool, GLOBAL_BUFFER_POOL};
use crate::constant::CCSID_UCS2;
use crate::error::Error;

/// A configuration for connection
///
/// ```rs
/// let mut opts1 = Opts::default();
/// opts1.blocking_factor = 100;
///
/// let mut opts2 = Opts::try_from("hostdb://as400.example.com?block_size=64");
/// opts2.data_compression = true;
/// ```
#[derive(Debug, Clone, SmartDefault)]
pub struct Opts {
    /// Enable TCP_NODELAY socket option to disable Nagle's algorithm
    #[default = true]
    pub tcp_nodelay: bool,

    /// Hostname or IP address
    pub host: Option<String>,

    /// Port of the database host server
    #[default = 8471]
    pub port: u16,

    /// Rows requested per forward fetch
    #[default = 32]
    pub blocking_factor: u32,

    /// Server buffer cap for forward fetches, in KiB
    #[default = 32]
    pub block_size: u32,

    /// Ask the host to send varying fields at their actual length
    #[default = true]
    pub variable_field_compression: bool,

    /// RLE-compress large requests and ask for compressed replies
    pub data_compression: bool,

    /// CCSID of client strings sent to the host
    #[default(CCSID_UCS2)]
    pub ccsid: u16,

    #[default(Arc::clone(&GLOBAL_BUFFER_POOL))]
    pub buffer_pool: Arc<BufferPool>,
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::BadConfigError(format!("Invalid value for {}: '{}'", key, value)))
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(url: &str) -> Result<Self, Self::Error> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::BadConfigError(format!("Failed to parse host URL: {}", e)))?;

        if parsed.scheme() != "hostdb" {
            return Err(Error::BadConfigError(format!(
                "Invalid URL scheme '{}', expected 'hostdb'",
                parsed.scheme()
            )));
        }

        let mut opts = Self {
            host: parsed
                .host_str()
                .filter(|h| !h.is_empty())
                .map(ToString::to_string),
            ..Default::default()
        };
        if let Some(port) = parsed.port() {
            opts.port = port;
        }

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "blocking_factor" => opts.blocking_factor = parse_value(&key, &value)?,
                "block_size" => opts.block_size = parse_value(&key, &value)?,
                "variable_field_compression" => {
                    opts.variable_field_compression = parse_value(&key, &value)?
                }
                "data_compression" => opts.data_compression = parse_value(&key, &value)?,
                "ccsid" => opts.ccsid = parse_value(&key, &value)?,
                "tcp_nodelay" => opts.tcp_nodelay = parse_value(&key, &value)?,
                other => {
                    return Err(Error::BadConfigError(format!(
                        "Unknown option '{}'",
                        other
                    )));
                }
            }
        }

        if opts.blocking_factor == 0 {
            return Err(Error::BadConfigError(
                "blocking_factor must be at least 1".to_string(),
            ));
        }
        opts.block_size_bytes()?;
        Ok(opts)
    }
}

impl Opts {
    /// `block_size` in bytes, as sent in the fetch buffer size parameter
    pub fn block_size_bytes(&self) -> Result<u32, Error> {
        self.block_size.checked_mul(1024).ok_or_else(|| {
            Error::BadConfigError(format!(
                "block_size {} KiB does not fit a fetch buffer size",
                self.block_size
            ))
        })
    }
}

impl TryFrom<String> for Opts {
    type Error = Error;

    fn try_from(url: String) -> Result<Self, Self::Error> {
        Self::try_from(url.as_str())
    }
}
