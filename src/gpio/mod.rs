//! Raw line control for the four microwire signals.
//!
//! The protocol only needs two outputs toggled with a minimum delay between
//! edges (chip select, clock), one data output and one data input; the
//! backends map those logical lines to GPIO numbers.

use std::fmt;
use std::ops::{
	Deref,
	DerefMut,
};
use std::thread;
use std::time::{
	Duration,
	Instant,
};

pub mod linux;
pub mod sim;

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Line {
	/// select the device (active high on 93C46 parts)
	ChipSelect,
	Clock,
	/// host -> device ("DI" pin of the EEPROM)
	DataOut,
	/// device -> host ("DO" pin of the EEPROM); also carries READY/BUSY
	DataIn,
}

impl Line {
	pub const ALL: [Line; 4] = [
		Line::ChipSelect,
		Line::Clock,
		Line::DataOut,
		Line::DataIn,
	];

	pub fn name(&self) -> &'static str {
		match self {
			Line::ChipSelect => "CS",
			Line::Clock => "SCLK",
			Line::DataOut => "MOUT",
			Line::DataIn => "MIN",
		}
	}
}

impl fmt::Display for Line {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// GPIO numbers (Broadcom numbering on a Raspberry Pi) for each line
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PinMap {
	pub chip_select: u32,
	pub clock: u32,
	pub data_out: u32,
	pub data_in: u32,
}

impl Default for PinMap {
	// SPI0 header pins: CE0, SCLK, MOSI, MISO
	fn default() -> Self {
		PinMap {
			chip_select: 8,
			clock: 11,
			data_out: 10,
			data_in: 9,
		}
	}
}

impl PinMap {
	pub fn pin(&self, line: Line) -> u32 {
		match line {
			Line::ChipSelect => self.chip_select,
			Line::Clock => self.clock,
			Line::DataOut => self.data_out,
			Line::DataIn => self.data_in,
		}
	}

	pub fn validate(&self) -> crate::AResult<()> {
		for (i, a) in Line::ALL.iter().enumerate() {
			for b in &Line::ALL[i + 1..] {
				ensure!(self.pin(*a) != self.pin(*b),
					"{} and {} can't share GPIO {}", a, b, self.pin(*a)
				);
			}
		}
		Ok(())
	}
}

impl fmt::Display for PinMap {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "cs={}, sclk={}, mout={}, min={}",
			self.chip_select, self.clock, self.data_out, self.data_in
		)
	}
}

/// Line level access; `true` is HIGH.
///
/// Writing and reading lines can't fail from the protocol point of view;
/// backends log I/O errors instead of returning them.
pub trait GpioPort {
	fn configure_output(&mut self, line: Line);
	fn configure_input(&mut self, line: Line);
	fn write_line(&mut self, line: Line, level: bool);
	fn read_line(&mut self, line: Line) -> bool;

	// block for (at least) the given time
	fn sleep_microseconds(&mut self, us: u32) {
		reliable_sleep(Duration::from_micros(us.into()));
	}
}

impl<'a, P: ?Sized + GpioPort> GpioPort for &'a mut P {
	fn configure_output(&mut self, line: Line) {
		P::configure_output(*self, line)
	}
	fn configure_input(&mut self, line: Line) {
		P::configure_input(*self, line)
	}
	fn write_line(&mut self, line: Line, level: bool) {
		P::write_line(*self, line, level)
	}
	fn read_line(&mut self, line: Line) -> bool {
		P::read_line(*self, line)
	}
	fn sleep_microseconds(&mut self, us: u32) {
		P::sleep_microseconds(*self, us)
	}
}

/// Lines configured for the protocol; restores the idle pin state on drop.
pub struct PortGuard<P: GpioPort>(P);

/// Bring the lines into their idle state: device deselected, clock and data
/// low, data input readable.
pub fn setup<P: GpioPort>(mut port: P) -> PortGuard<P> {
	// set the level before switching direction so the line never glitches
	port.write_line(Line::ChipSelect, false);
	port.configure_output(Line::ChipSelect);
	port.write_line(Line::DataOut, false);
	port.configure_output(Line::DataOut);
	port.write_line(Line::Clock, false);
	port.configure_output(Line::Clock);
	port.configure_input(Line::DataIn);

	PortGuard(port)
}

impl<P: GpioPort> Drop for PortGuard<P> {
	fn drop(&mut self) {
		self.0.configure_input(Line::DataOut);
		self.0.configure_input(Line::Clock);
		// chip select stays an output: leave the device deselected
		self.0.write_line(Line::ChipSelect, false);
	}
}

impl<P: GpioPort> Deref for PortGuard<P> {
	type Target = P;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<P: GpioPort> DerefMut for PortGuard<P> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

impl<P: GpioPort> GpioPort for PortGuard<P> {
	fn configure_output(&mut self, line: Line) {
		self.0.configure_output(line)
	}
	fn configure_input(&mut self, line: Line) {
		self.0.configure_input(line)
	}
	fn write_line(&mut self, line: Line, level: bool) {
		self.0.write_line(line, level)
	}
	fn read_line(&mut self, line: Line) -> bool {
		self.0.read_line(line)
	}
	fn sleep_microseconds(&mut self, us: u32) {
		self.0.sleep_microseconds(us)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct Log(Vec<String>);

	impl GpioPort for Log {
		fn configure_output(&mut self, line: Line) {
			self.0.push(format!("out {}", line));
		}
		fn configure_input(&mut self, line: Line) {
			self.0.push(format!("in {}", line));
		}
		fn write_line(&mut self, line: Line, level: bool) {
			self.0.push(format!("{}={}", line, level as u8));
		}
		fn read_line(&mut self, _line: Line) -> bool {
			true
		}
	}

	#[test]
	fn setup_and_teardown_order() {
		let mut log = Log::default();
		drop(setup(&mut log));
		assert_eq!(log.0, vec![
			"CS=0", "out CS",
			"MOUT=0", "out MOUT",
			"SCLK=0", "out SCLK",
			"in MIN",
			"in MOUT", "in SCLK", "CS=0",
		]);
	}

	#[test]
	fn default_pins_are_distinct() {
		assert!(PinMap::default().validate().is_ok());
		let pins = PinMap { clock: 8, ..PinMap::default() };
		assert!(pins.validate().is_err());
	}
}
