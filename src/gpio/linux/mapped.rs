use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::FromRawFd;
use std::ptr;

use libc::{
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	c_void,
	mmap,
	munmap,
	open,
};

use crate::gpio::{
	GpioPort,
	Line,
	PinMap,
};

/* BCM2835..BCM2711 GPIO register block (offsets in bytes) */
const GPFSEL0: usize = 0x00; // function select, 3 bits per pin, 10 pins per register
const GPSET0: usize = 0x1c;
const GPCLR0: usize = 0x28;
const GPLEV0: usize = 0x34;

const FSEL_INPUT: u32 = 0b000;
const FSEL_OUTPUT: u32 = 0b001;
const FSEL_MASK: u32 = 0b111;

const MAX_PIN: u32 = 53;

// /dev/gpiomem is a character device: no useful metadata length, map one page
const BLOCK_SIZE: usize = 4096;

#[derive(Debug)]
pub struct GpioMem {
	ptr: ptr::NonNull<u32>,
	len: usize,
	pins: PinMap,
}

impl Drop for GpioMem {
	fn drop(&mut self) {
		unsafe {
			let res = munmap(
				self.ptr.as_ptr() as *mut c_void,
				self.len,
			);
			if 0 != res {
				error!("munmap failed: {}", io::Error::last_os_error());
			}
		}
	}
}

impl GpioMem {
	fn read_register(&self, offset: usize) -> u32 {
		assert!(offset & 3 == 0);
		assert!(offset + 3 < self.len);
		unsafe { ptr::read_volatile(self.ptr.as_ptr().add(offset / 4)) }
	}

	fn write_register(&mut self, offset: usize, data: u32) {
		assert!(offset & 3 == 0);
		assert!(offset + 3 < self.len);
		unsafe { ptr::write_volatile(self.ptr.as_ptr().add(offset / 4), data) }
	}

	fn set_function(&mut self, pin: u32, function: u32) {
		let offset = GPFSEL0 + (pin as usize / 10) * 4;
		let shift = (pin % 10) * 3;
		let fsel = self.read_register(offset);
		self.write_register(offset, (fsel & !(FSEL_MASK << shift)) | (function << shift));
	}
}

impl GpioPort for GpioMem {
	fn configure_output(&mut self, line: Line) {
		let pin = self.pins.pin(line);
		self.set_function(pin, FSEL_OUTPUT);
	}

	fn configure_input(&mut self, line: Line) {
		let pin = self.pins.pin(line);
		self.set_function(pin, FSEL_INPUT);
	}

	fn write_line(&mut self, line: Line, level: bool) {
		let pin = self.pins.pin(line);
		// set/clear registers: writing 0 bits has no effect
		let base = if level { GPSET0 } else { GPCLR0 };
		self.write_register(base + (pin as usize / 32) * 4, 1 << (pin % 32));
	}

	fn read_line(&mut self, line: Line) -> bool {
		let pin = self.pins.pin(line);
		0 != self.read_register(GPLEV0 + (pin as usize / 32) * 4) & (1 << (pin % 32))
	}
}

pub fn inner_open(path: &str, pins: PinMap) -> crate::AResult<GpioMem> {
	for line in Line::ALL.iter() {
		ensure!(pins.pin(*line) <= MAX_PIN, "GPIO {} for {} out of range (max {})", pins.pin(*line), line, MAX_PIN);
	}

	let path = CString::new(path)?;

	let fd = unsafe { open(path.as_ptr(), O_RDWR | O_CLOEXEC | O_SYNC) };
	if -1 == fd {
		return Err(io::Error::last_os_error().into());
	}
	// now get fd managed to prevent resource leak; the mapping stays valid
	// after closing it
	let _f = unsafe { fs::File::from_raw_fd(fd) };

	let area = unsafe {
		mmap(
			ptr::null_mut(),
			BLOCK_SIZE,
			PROT_READ | PROT_WRITE,
			MAP_SHARED,
			fd,
			0,
		)
	};

	if area as usize == !0usize {
		return Err(io::Error::last_os_error().into());
	}
	match ptr::NonNull::new(area as *mut u32) {
		None => bail!("mmap returned NULL"),
		Some(area) => {
			info!("GPIO: mapped {} ({})", path.to_string_lossy(), pins);
			Ok(GpioMem {
				ptr: area,
				len: BLOCK_SIZE,
				pins,
			})
		},
	}
}
