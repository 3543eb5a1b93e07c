//! Flash workflows built from the BSL commands.
//!
//! Every workflow starts from a fresh connection, aborts on the first
//! failing command and propagates its error unchanged. Between chunks the
//! interrupt checker is consulted so a long transfer can be stopped cleanly;
//! an exchange in flight is never cut short.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mspm0flash::{FirmwareImage, FlashOptions, Flasher};
//! use mspm0flash::port::{NativePort, SerialConfig};
//! use mspm0flash::transport::LinkTransport;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let transport = LinkTransport::new(port)?;
//!
//!     let image = FirmwareImage::from_file("app.bin")?;
//!     let mut flasher = Flasher::new(transport, FlashOptions::default().with_start(true));
//!     flasher.flash(&image, |current, total| {
//!         println!("{current}/{total}");
//!     })?;
//!     Ok(())
//! }
//! ```

use log::{debug, info, warn};

use crate::bsl::Bsl;
use crate::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::image::{FirmwareImage, VerifyRegion};
use crate::protocol::command::{BaudRate, PROGRAM_DATA_MAX_LEN, Password};
use crate::transport::Transport;

/// Bytes requested per Memory Read-Back command.
pub const READ_BACK_CHUNK: usize = 256;

/// Workflow settings.
#[derive(Debug, Clone, Default)]
pub struct FlashOptions {
    /// Unlock password.
    pub password: Password,
    /// Flash address the image starts at.
    pub base_address: u32,
    /// Explicit verification length; the image length rounded up to 1 KiB
    /// when unset.
    pub crc_len: Option<u32>,
    /// Start the application after a successful flash.
    pub start: bool,
    /// Extra attempts for a command that failed with a transport error.
    pub retries: usize,
    /// UART rate to switch to after connecting.
    pub baud_rate: Option<BaudRate>,
}

impl FlashOptions {
    /// Set the unlock password.
    #[must_use]
    pub fn with_password(mut self, password: Password) -> Self {
        self.password = password;
        self
    }

    /// Set the image base address.
    #[must_use]
    pub fn with_base_address(mut self, base_address: u32) -> Self {
        self.base_address = base_address;
        self
    }

    /// Set an explicit verification length.
    #[must_use]
    pub fn with_crc_len(mut self, crc_len: Option<u32>) -> Self {
        self.crc_len = crc_len;
        self
    }

    /// Start the application after flashing.
    #[must_use]
    pub fn with_start(mut self, start: bool) -> Self {
        self.start = start;
        self
    }

    /// Set the transport retry count.
    #[must_use]
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Switch the UART rate after connecting.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: Option<BaudRate>) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

type InterruptChecker = Box<dyn Fn() -> bool + Send>;

/// Sequences BSL commands into complete operations.
pub struct Flasher<T: Transport> {
    bsl: Bsl<T>,
    options: FlashOptions,
    interrupt: Option<InterruptChecker>,
}

impl<T: Transport> Flasher<T> {
    /// Create a flasher on an opened transport.
    pub fn new(transport: T, options: FlashOptions) -> Self {
        Self {
            bsl: Bsl::new(transport),
            options,
            interrupt: None,
        }
    }

    /// Use `checker` instead of the process-wide interrupt checker.
    #[must_use]
    pub fn with_interrupt_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.interrupt = Some(Box::new(checker));
        self
    }

    /// Workflow settings.
    pub fn options(&self) -> &FlashOptions {
        &self.options
    }

    /// Underlying BSL session.
    pub fn bsl_mut(&mut self) -> &mut Bsl<T> {
        &mut self.bsl
    }

    /// Release the transport.
    pub fn into_inner(self) -> T {
        self.bsl.into_inner()
    }

    fn check_interrupted(&self) -> Result<()> {
        let interrupted = self
            .interrupt
            .as_ref()
            .map_or_else(crate::is_interrupted_requested, |checker| checker());
        if interrupted {
            warn!("Interrupted");
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Run `op`, repeating it on transport errors up to the retry count.
    ///
    /// Input left over from a failed attempt is discarded before the next one.
    fn with_retries<R>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut Bsl<T>) -> Result<R>,
    ) -> Result<R> {
        let attempts = self.options.retries + 1;
        let mut attempt = 1;
        loop {
            match op(&mut self.bsl) {
                Err(e) if e.is_transport() && attempt < attempts => {
                    warn!("{what} failed (attempt {attempt}/{attempts}): {e}");
                    self.bsl.transport_mut().discard_input()?;
                    attempt += 1;
                },
                result => return result,
            }
        }
    }

    /// Connect and switch the UART rate if one was requested.
    pub fn connect(&mut self) -> Result<()> {
        debug!("Connecting");
        self.with_retries("Connect", Bsl::connect)?;

        if let Some(rate) = self.options.baud_rate {
            info!("Changing baud rate to {rate}");
            self.bsl.change_baud_rate(rate)?;
        }
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let password = self.options.password;
        info!("Unlocking bootloader");
        self.with_retries("Unlock", |bsl| bsl.unlock(&password))
    }

    /// Connect and read the device information.
    pub fn info(&mut self) -> Result<DeviceInfo> {
        self.connect()?;
        self.with_retries("Get device info", Bsl::get_device_info)
    }

    /// Connect, unlock and erase the main flash.
    pub fn erase(&mut self) -> Result<()> {
        self.connect()?;
        self.unlock()?;
        self.mass_erase()
    }

    fn mass_erase(&mut self) -> Result<()> {
        info!("Erasing flash");
        self.with_retries("Mass erase", Bsl::mass_erase)
    }

    /// Connect, unlock, erase, program `image`, verify it and optionally
    /// start the application.
    ///
    /// `progress` receives `(bytes_programmed, total_bytes)` after every
    /// chunk. Returns the verified region.
    pub fn flash<F>(&mut self, image: &FirmwareImage, mut progress: F) -> Result<VerifyRegion>
    where
        F: FnMut(usize, usize),
    {
        self.connect()?;
        self.unlock()?;
        self.mass_erase()?;

        let data = image.program_data();
        let total = data.len();
        let base = self.options.base_address;
        info!("Programming {} bytes at {base:#010x}", image.len());

        progress(0, total);
        let mut offset = 0usize;
        for chunk in data.chunks(PROGRAM_DATA_MAX_LEN) {
            self.check_interrupted()?;

            let address = chunk_address(base, offset)?;
            self.with_retries("Program data", |bsl| bsl.program_data(address, chunk))?;

            offset += chunk.len();
            progress(offset, total);
        }

        let region = self.verify_image(image)?;

        if self.options.start {
            info!("Starting application");
            self.bsl.start_application()?;
        }
        Ok(region)
    }

    /// Connect, unlock and compare the device CRC with `image`.
    pub fn verify(&mut self, image: &FirmwareImage) -> Result<VerifyRegion> {
        self.connect()?;
        self.unlock()?;
        self.verify_image(image)
    }

    fn verify_image(&mut self, image: &FirmwareImage) -> Result<VerifyRegion> {
        let region = image.verify_region(self.options.crc_len)?;
        let base = self.options.base_address;
        info!("Verifying {} bytes at {base:#010x}", region.length);

        let actual = self.with_retries("Verify", |bsl| bsl.verify(base, region.length))?;
        debug!(
            "CRC32 device={actual:#010x} image={:#010x}",
            region.crc
        );
        if actual != region.crc {
            return Err(Error::VerifyMismatch {
                expected: region.crc,
                actual,
            });
        }
        Ok(region)
    }

    /// Connect, unlock and read `len` bytes starting at `address`.
    pub fn read_back<F>(&mut self, address: u32, len: usize, mut progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(usize, usize),
    {
        self.connect()?;
        self.unlock()?;

        info!("Reading {len} bytes at {address:#010x}");
        let mut data = Vec::with_capacity(len);
        progress(0, len);
        while data.len() < len {
            self.check_interrupted()?;

            let count = (len - data.len()).min(READ_BACK_CHUNK);
            let chunk_addr = chunk_address(address, data.len())?;
            let count_u32 = u32::try_from(count).map_err(|_| {
                Error::Config(format!("read back chunk of {count} bytes"))
            })?;
            let chunk = self.with_retries("Read back", |bsl| bsl.read_back(chunk_addr, count_u32))?;
            data.extend_from_slice(&chunk);
            progress(data.len(), len);
        }
        Ok(data)
    }

    /// Connect and start the application.
    pub fn start_application(&mut self) -> Result<()> {
        self.connect()?;
        info!("Starting application");
        self.bsl.start_application()
    }
}

fn chunk_address(base: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| {
            Error::InvalidImage(format!(
                "offset {offset:#x} from {base:#010x} leaves the 32-bit address space"
            ))
        })
}
