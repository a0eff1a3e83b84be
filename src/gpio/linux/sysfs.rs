use std::fs;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{
	Path,
	PathBuf,
};
use std::thread;
use std::time::Duration;

use crate::gpio::{
	GpioPort,
	Line,
	PinMap,
};

// after exporting, udev needs a moment to fix up permissions of the new files
const EXPORT_ATTEMPTS: usize = 10;
const EXPORT_DELAY: Duration = Duration::from_millis(50);

pub struct SysfsGpio {
	base: PathBuf,
	pins: PinMap,
	// value files, indexed by `Line as usize`
	values: Vec<fs::File>,
	// pins we exported ourselves and have to unexport again
	exported: Vec<u32>,
}

fn write_attribute(path: PathBuf, value: &str) -> crate::AResult<()> {
	// sysfs attributes need to be written in one syscall
	with_context!(("write {:?} to {}", value, path.display()), {
		fs::OpenOptions::new().write(true).open(&path)?.write_all(value.as_bytes())?;

		Ok(())
	})
}

impl SysfsGpio {
	fn pin_path(&self, pin: u32) -> PathBuf {
		self.base.join(format!("gpio{}", pin))
	}

	fn set_direction(&mut self, line: Line, direction: &str) {
		let path = self.pin_path(self.pins.pin(line)).join("direction");
		if let Err(e) = write_attribute(path, direction) {
			error!("Failed to configure {} as {}: {}", line, direction, e);
		}
	}
}

impl Drop for SysfsGpio {
	fn drop(&mut self) {
		self.values.clear();
		for pin in self.exported.drain(..) {
			if let Err(e) = write_attribute(self.base.join("unexport"), &pin.to_string()) {
				warn!("Failed to unexport GPIO {}: {}", pin, e);
			}
		}
	}
}

impl GpioPort for SysfsGpio {
	fn configure_output(&mut self, line: Line) {
		self.set_direction(line, "out");
	}

	fn configure_input(&mut self, line: Line) {
		self.set_direction(line, "in");
	}

	fn write_line(&mut self, line: Line, level: bool) {
		let value = if level { b"1" } else { b"0" };
		if let Err(e) = self.values[line as usize].write_at(value, 0) {
			error!("Failed to set {}: {}", line, e);
		}
	}

	fn read_line(&mut self, line: Line) -> bool {
		let mut buf = [0u8; 1];
		match self.values[line as usize].read_at(&mut buf, 0) {
			Ok(1) => buf[0] == b'1',
			Ok(_) => {
				error!("Failed to get {}: empty value", line);
				false
			},
			Err(e) => {
				error!("Failed to get {}: {}", line, e);
				false
			},
		}
	}
}

fn open_value(path: &Path) -> crate::AResult<fs::File> {
	let mut attempt = 0;
	loop {
		match fs::OpenOptions::new().read(true).write(true).open(path) {
			Ok(f) => return Ok(f),
			Err(e) => {
				attempt += 1;
				if attempt >= EXPORT_ATTEMPTS {
					bail!("open {}: {}", path.display(), e);
				}
				thread::sleep(EXPORT_DELAY);
			},
		}
	}
}

pub fn inner_open(base: PathBuf, pins: PinMap) -> crate::AResult<SysfsGpio> {
	let mut port = SysfsGpio {
		base,
		pins,
		values: Vec::new(),
		exported: Vec::new(),
	};

	// `Line::ALL` is in discriminant order, so `values` can be indexed by line
	for line in Line::ALL.iter() {
		let pin = pins.pin(*line);
		let dir = port.pin_path(pin);
		if !dir.exists() {
			debug!("GPIO: exporting {} for {}", pin, line);
			write_attribute(port.base.join("export"), &pin.to_string())?;
			port.exported.push(pin);
		}
		let value = open_value(&dir.join("value"))?;
		port.values.push(value);
	}

	info!("GPIO: using sysfs {} ({})", port.base.display(), pins);
	Ok(port)
}

#[cfg(test)]
mod tests {
	use super::*;

	// a fake sysfs tree with already exported pins
	fn fake_tree(pins: PinMap) -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		for line in Line::ALL.iter() {
			let pin_dir = dir.path().join(format!("gpio{}", pins.pin(*line)));
			fs::create_dir(&pin_dir).unwrap();
			fs::write(pin_dir.join("value"), b"0").unwrap();
			fs::write(pin_dir.join("direction"), b"in").unwrap();
		}
		dir
	}

	#[test]
	fn drives_value_and_direction_files() {
		let pins = PinMap::default();
		let dir = fake_tree(pins);
		let mut port = inner_open(dir.path().to_path_buf(), pins).unwrap();
		assert!(port.exported.is_empty());

		port.configure_output(Line::Clock);
		port.write_line(Line::Clock, true);
		assert!(port.read_line(Line::Clock));

		let clk = dir.path().join(format!("gpio{}", pins.clock));
		assert_eq!(fs::read(clk.join("direction")).unwrap(), b"out");
		assert_eq!(fs::read(clk.join("value")).unwrap(), b"1");

		port.write_line(Line::Clock, false);
		assert!(!port.read_line(Line::Clock));
		assert!(!port.read_line(Line::DataIn));
	}
}
