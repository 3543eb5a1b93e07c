//! Settings of one flashing session, merged from the command line and the
//! config file, and the init/open/close/exit bracket around an operation.

use anyhow::{Context, Result};
use log::debug;
use mspm0flash::{
    BaudRate, FlashOptions, Flasher, FlowControl, Password, Transport,
    port::DEFAULT_BAUD_RATE, transport::bus::DEFAULT_ADDRESS,
};

use crate::config::Config;
use crate::interface::Interface;
use crate::script::ControlScript;
use crate::{Cli, CliError};

/// A resolved flashing session.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub interface: Interface,
    pub options: FlashOptions,
    pub script: Option<ControlScript>,
    pub quiet: bool,
}

fn usage(message: impl Into<String>) -> anyhow::Error {
    CliError::Usage(message.into()).into()
}

impl Session {
    /// Merge command-line arguments over the loaded configuration.
    pub(crate) fn new(cli: &Cli, config: &Config) -> Result<Self> {
        let interface = resolve_interface(cli, config)?;

        let target_baud = match (cli.target_baud, config.connection.target_baud) {
            (Some(rate), _) => Some(rate),
            (None, Some(bps)) => Some(BaudRate::try_from(bps).map_err(|_| {
                usage(format!("unsupported target_baud {bps} in config file"))
            })?),
            (None, None) => None,
        };
        if target_baud.is_some() && !interface.is_serial() {
            return Err(usage("--target-baud only applies to a serial interface"));
        }

        let password = match cli.password.as_deref().or(config.flash.password.as_deref()) {
            Some(hex) => Password::from_hex(hex)
                .map_err(|e| usage(format!("invalid password: {e}")))?,
            None => Password::default(),
        };

        let options = FlashOptions::default()
            .with_password(password)
            .with_crc_len(config.flash.crc_len)
            .with_start(cli.start || config.flash.start)
            .with_retries(cli.retries.or(config.flash.retries).unwrap_or(0))
            .with_baud_rate(target_baud);

        let script_enabled = !cli.no_script && config.script.enabled.unwrap_or(true);
        let script = script_enabled.then(|| {
            ControlScript::resolve(cli.ctrl_script.as_deref(), config.script.path.as_deref())
        });

        debug!("Interface: {interface}");
        if let Some(script) = &script {
            debug!("Control script: {}", script.path().display());
        }
        Ok(Self {
            interface,
            options,
            script,
            quiet: cli.quiet,
        })
    }

    /// Use an explicit verification length from the subcommand, if given.
    #[must_use]
    pub(crate) fn with_crc_len(&self, crc_len: Option<u32>) -> Self {
        let mut session = self.clone();
        if crc_len.is_some() {
            session.options.crc_len = crc_len;
        }
        session
    }

    /// Run `op` with the interface open.
    ///
    /// The control script's `init` runs first and aborts the session when it
    /// fails. Its `exit` runs after the interface is closed, whatever the
    /// outcome of `op`.
    pub(crate) fn run<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Flasher<Box<dyn Transport>>) -> mspm0flash::Result<R>,
    {
        if let Some(script) = &self.script {
            script.init().context("Control script init failed")?;
        }

        let result = self.open_and_run(op);

        if let Some(script) = &self.script {
            script.exit();
        }
        result
    }

    fn open_and_run<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Flasher<Box<dyn Transport>>) -> mspm0flash::Result<R>,
    {
        let transport = self
            .interface
            .open()
            .with_context(|| format!("Failed to open {}", self.interface))?;
        let mut flasher = Flasher::new(transport, self.options.clone());
        op(&mut flasher).map_err(|e| match e {
            mspm0flash::Error::Interrupted => {
                CliError::Cancelled("Operation interrupted by user".to_string()).into()
            },
            other => anyhow::Error::from(other),
        })
    }
}

fn resolve_interface(cli: &Cli, config: &Config) -> Result<Interface> {
    let conn = &config.connection;

    let (i2c, serial) = if cli.i2c.is_some() || cli.serial.is_some() {
        (cli.i2c.clone(), cli.serial.clone())
    } else {
        (conn.i2c.clone(), conn.serial.clone())
    };

    match (i2c, serial) {
        (Some(device), None) => Ok(Interface::I2c {
            device,
            address: cli
                .i2c_address
                .or(conn.i2c_address)
                .unwrap_or(DEFAULT_ADDRESS),
        }),
        (None, Some(device)) => {
            let flow_control = if cli.software_flow_control {
                FlowControl::Software
            } else {
                conn.flow_control.unwrap_or_default()
            };
            Ok(Interface::Serial {
                device,
                baud_rate: cli.baud.or(conn.baud).unwrap_or(DEFAULT_BAUD_RATE),
                flow_control,
            })
        },
        (Some(_), Some(_)) => Err(usage(
            "the config file sets both an I2C and a serial device; pass --i2c or --serial",
        )),
        (None, None) => Err(usage(
            "either an I2C or a serial interface is required (use --i2c <DEV> or --serial <DEV>)",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["mspm0flash"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn usage_error(result: Result<Session>) -> String {
        let err = result.unwrap_err();
        match err.downcast_ref::<CliError>() {
            Some(CliError::Usage(message)) => message.clone(),
            other => panic!("expected usage error, got {other:?}"),
        }
    }

    #[test]
    fn test_i2c_defaults() {
        let session = Session::new(&parse(&["-I", "/dev/i2c-1", "info"]), &Config::default()).unwrap();
        assert_eq!(
            session.interface,
            Interface::I2c {
                device: "/dev/i2c-1".to_string(),
                address: 0x48,
            }
        );
        assert_eq!(session.options.retries, 0);
        assert!(!session.options.start);
        assert_eq!(session.options.password, Password::default());
        assert!(session.script.is_some());
    }

    #[test]
    fn test_serial_defaults() {
        let session =
            Session::new(&parse(&["-S", "/dev/ttyUSB0", "erase"]), &Config::default()).unwrap();
        assert_eq!(
            session.interface,
            Interface::Serial {
                device: "/dev/ttyUSB0".to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
                flow_control: FlowControl::None,
            }
        );
    }

    #[test]
    fn test_config_supplies_interface() {
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyS2".to_string());
        config.connection.baud = Some(115200);
        config.connection.flow_control = Some(FlowControl::Software);
        config.flash.retries = Some(2);
        config.flash.start = true;

        let session = Session::new(&parse(&["info"]), &config).unwrap();
        assert_eq!(
            session.interface,
            Interface::Serial {
                device: "/dev/ttyS2".to_string(),
                baud_rate: 115200,
                flow_control: FlowControl::Software,
            }
        );
        assert_eq!(session.options.retries, 2);
        assert!(session.options.start);
    }

    #[test]
    fn test_cli_interface_overrides_config() {
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyS2".to_string());
        config.connection.i2c_address = Some(0x4a);

        let session = Session::new(&parse(&["-I", "/dev/i2c-0", "info"]), &config).unwrap();
        assert_eq!(
            session.interface,
            Interface::I2c {
                device: "/dev/i2c-0".to_string(),
                address: 0x4a,
            }
        );
    }

    #[test]
    fn test_missing_interface_is_usage_error() {
        let message = usage_error(Session::new(&parse(&["info"]), &Config::default()));
        assert!(message.contains("--i2c"));
    }

    #[test]
    fn test_config_with_both_interfaces_is_usage_error() {
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyS2".to_string());
        config.connection.i2c = Some("/dev/i2c-1".to_string());
        usage_error(Session::new(&parse(&["info"]), &config));
    }

    #[test]
    fn test_target_baud_requires_serial() {
        let message = usage_error(Session::new(
            &parse(&["-I", "/dev/i2c-1", "--target-baud", "115200", "info"]),
            &Config::default(),
        ));
        assert!(message.contains("serial"));

        let session = Session::new(
            &parse(&["-S", "/dev/ttyUSB0", "--target-baud", "115200", "info"]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(session.options.baud_rate, Some(BaudRate::B115200));
    }

    #[test]
    fn test_invalid_password_is_usage_error() {
        let message = usage_error(Session::new(
            &parse(&["-S", "/dev/ttyUSB0", "--password", "1234", "erase"]),
            &Config::default(),
        ));
        assert!(message.contains("password"));
    }

    #[test]
    fn test_password_from_config() {
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyS0".to_string());
        config.flash.password = Some("00".repeat(32));

        let session = Session::new(&parse(&["erase"]), &config).unwrap();
        assert_eq!(session.options.password, Password::new([0; 32]));
    }

    #[test]
    fn test_script_can_be_disabled() {
        let session =
            Session::new(&parse(&["-n", "-S", "/dev/ttyUSB0", "info"]), &Config::default()).unwrap();
        assert!(session.script.is_none());

        let mut config = Config::default();
        config.script.enabled = Some(false);
        let session = Session::new(&parse(&["-S", "/dev/ttyUSB0", "info"]), &config).unwrap();
        assert!(session.script.is_none());
    }

    #[test]
    fn test_crc_len_override() {
        let mut config = Config::default();
        config.connection.serial = Some("/dev/ttyS0".to_string());
        config.flash.crc_len = Some(0x1000);

        let session = Session::new(&parse(&["info"]), &config).unwrap();
        assert_eq!(session.with_crc_len(None).options.crc_len, Some(0x1000));
        assert_eq!(session.with_crc_len(Some(0x2000)).options.crc_len, Some(0x2000));
    }

    #[test]
    fn test_open_failure_is_transport_error() {
        let mut session =
            Session::new(&parse(&["-S", "/dev/mspm0flash-missing", "info"]), &Config::default())
                .unwrap();
        session.script = None;
        let err = session.run(|flasher| flasher.info()).unwrap_err();
        assert!(format!("{err:#}").contains("/dev/mspm0flash-missing"));
        assert!(
            err.downcast_ref::<mspm0flash::Error>()
                .is_some_and(mspm0flash::Error::is_transport)
        );
    }
}
