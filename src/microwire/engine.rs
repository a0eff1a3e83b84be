use failure::Fail;

use crate::gpio::{
	GpioPort,
	Line,
};

use super::{
	Command,
	Timing,
	WORD_BITS,
};

// dummy "0" bit + 16 data bits
const READ_BITS: usize = 17;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum DeviceError {
	#[fail(display = "EEPROM timeout: still busy after {} status polls", polls)]
	Timeout {
		polls: u32,
	},
}

/// Runs single microwire transactions on a port.
///
/// Not meant to be shared: interleaved transactions corrupt the device
/// protocol, so hosts with multiple threads need to put the engine behind a
/// mutex.
pub struct Engine<P: GpioPort> {
	port: P,
	timing: Timing,
}

impl<P: GpioPort> Engine<P> {
	pub fn new(port: P, timing: Timing) -> Self {
		Engine {
			port,
			timing,
		}
	}

	pub fn port(&self) -> &P {
		&self.port
	}

	pub fn into_port(self) -> P {
		self.port
	}

	// CLK up, wait, CLK down; the device samples DATA on the rising edge
	fn clock_pulse(&mut self) {
		self.port.write_line(Line::Clock, true);
		self.port.sleep_microseconds(self.timing.clock_high_us);
		self.port.write_line(Line::Clock, false);
	}

	/// select the device until it reports READY; returns the number of polls
	///
	/// On success the device stays selected.
	fn wait_ready(&mut self) -> Result<u32, DeviceError> {
		for poll in 1..=self.timing.busy_retries {
			self.port.write_line(Line::ChipSelect, true);
			self.port.sleep_microseconds(self.timing.clock_low_us);
			// status is valid after one full clock cycle with CS
			self.clock_pulse();
			if self.port.read_line(Line::DataIn) {
				return Ok(poll);
			}
			// deselect before waiting, otherwise the status never updates
			self.port.write_line(Line::ChipSelect, false);
			self.port.sleep_microseconds(self.timing.busy_retry_us);
		}

		self.port.write_line(Line::ChipSelect, false);
		Err(DeviceError::Timeout {
			polls: self.timing.busy_retries,
		})
	}

	// MSB first; leading zeros are ignored until the start bit
	fn shift_out(&mut self, word: u32) {
		for bit in (0..WORD_BITS).rev() {
			self.port.write_line(Line::DataOut, 0 != word & (1 << bit));
			self.port.sleep_microseconds(self.timing.clock_low_us);
			self.clock_pulse();
		}
	}

	// sample before each rising edge: the device shifts the next bit out on it
	fn shift_in(&mut self) -> u16 {
		self.port.write_line(Line::DataOut, false);
		let mut result = 0u32;
		for _ in 0..READ_BITS {
			self.port.sleep_microseconds(self.timing.clock_low_us);
			result = (result << 1) | self.port.read_line(Line::DataIn) as u32;
			self.clock_pulse();
		}
		// drops the dummy bit
		result as u16
	}

	/// One complete transaction: wait for READY, send `command`, optionally
	/// receive 16 bits, deselect.
	///
	/// Fails only if the device stays busy for the whole retry budget, in
	/// which case no command bit was sent.
	pub fn transact(&mut self, command: Command, wants_read: bool) -> Result<Option<u16>, DeviceError> {
		let word = command.encode();
		trace!("microwire: {} (0x{:08x})", command, word);

		// DATA is ignored by the device until a start bit
		self.port.write_line(Line::DataOut, false);
		self.port.write_line(Line::Clock, false);
		self.port.sleep_microseconds(self.timing.settle_us);

		let polls = match self.wait_ready() {
			Ok(polls) => polls,
			Err(e) => {
				warn!("microwire: {} not sent: {} (waited at least {}us)", command, e, self.timing.worst_case_poll_us());
				return Err(e);
			},
		};
		if polls > 1 {
			debug!("microwire: device ready after {} polls", polls);
		}

		self.shift_out(word);
		let result = if wants_read {
			Some(self.shift_in())
		} else {
			None
		};

		self.port.sleep_microseconds(self.timing.cs_hold_us);
		self.port.write_line(Line::ChipSelect, false);
		self.port.sleep_microseconds(self.timing.cs_deselect_us);
		if command.programs() {
			trace!("microwire: {} started a programming cycle", command);
		}

		Ok(result)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	enum Event {
		Write(Line, bool),
		Read(Line),
		Sleep(u32),
	}

	// answers READY after `busy_polls` BUSY status reads, then plays `response`
	struct Recorder {
		events: Vec<Event>,
		busy_polls: usize,
		response: Vec<bool>,
		clock: bool,
		selected: bool,
		status_reads: usize,
		shifted: Vec<bool>,
	}

	impl Recorder {
		fn new(busy_polls: usize) -> Self {
			Recorder {
				events: Vec::new(),
				busy_polls,
				response: Vec::new(),
				clock: false,
				selected: false,
				status_reads: 0,
				shifted: Vec::new(),
			}
		}

		fn with_response(mut self, word: u16) -> Self {
			self.response.push(false);
			for bit in (0..16).rev() {
				self.response.push(0 != word & (1 << bit));
			}
			self
		}

		fn data_out_writes(&self) -> usize {
			self.events.iter().filter(|e| match e {
				Event::Write(Line::DataOut, _) => true,
				_ => false,
			}).count()
		}

		fn last_data_out(&self) -> bool {
			self.events.iter().rev().filter_map(|e| match e {
				Event::Write(Line::DataOut, level) => Some(*level),
				_ => None,
			}).next().unwrap_or(false)
		}
	}

	impl GpioPort for Recorder {
		fn configure_output(&mut self, _line: Line) {
		}
		fn configure_input(&mut self, _line: Line) {
		}
		fn write_line(&mut self, line: Line, level: bool) {
			self.events.push(Event::Write(line, level));
			match line {
				Line::ChipSelect => self.selected = level,
				Line::Clock => {
					if level && !self.clock && self.selected && self.status_reads > self.busy_polls {
						let data = self.last_data_out();
						self.shifted.push(data);
					}
					self.clock = level;
				},
				_ => (),
			}
		}
		fn read_line(&mut self, line: Line) -> bool {
			self.events.push(Event::Read(line));
			if self.status_reads <= self.busy_polls {
				self.status_reads += 1;
				return self.status_reads > self.busy_polls;
			}
			// response bits in the order they are sampled
			let index = self.shifted.len() - WORD_BITS;
			self.response.get(index).cloned().unwrap_or(true)
		}
		fn sleep_microseconds(&mut self, us: u32) {
			self.events.push(Event::Sleep(us));
		}
	}

	fn engine(rec: Recorder) -> Engine<Recorder> {
		Engine::new(rec, Timing::default())
	}

	#[test]
	fn ready_device_needs_one_poll() {
		let mut e = engine(Recorder::new(0));
		assert_eq!(e.transact(Command::WriteEnable, false), Ok(None));
		assert_eq!(e.port().status_reads, 1);
		let selects = e.port().events.iter()
			.filter(|ev| **ev == Event::Write(Line::ChipSelect, true))
			.count();
		assert_eq!(selects, 1);
	}

	#[test]
	fn shifts_32_bits_msb_first() {
		let mut e = engine(Recorder::new(0));
		let cmd = Command::Write(0x2a, 0x8001);
		e.transact(cmd, false).unwrap();

		// first status pulse isn't part of the word
		let shifted = &e.port().shifted;
		assert_eq!(shifted.len(), WORD_BITS);
		let word = shifted.iter().fold(0u32, |w, b| (w << 1) | *b as u32);
		assert_eq!(word, cmd.encode());
		assert_eq!(e.port().events.last(), Some(&Event::Sleep(1)));
		assert!(!e.port().selected);
	}

	#[test]
	fn read_discards_dummy_bit() {
		let mut e = engine(Recorder::new(2).with_response(0xa55a));
		assert_eq!(e.transact(Command::Read(0x10), true), Ok(Some(0xa55a)));
		assert_eq!(e.port().shifted.len(), WORD_BITS + READ_BITS);
		// DATA released low for the read phase
		assert!(!e.port().last_data_out());
	}

	#[test]
	fn busy_device_is_polled_again() {
		let mut e = engine(Recorder::new(3));
		e.transact(Command::EraseAll, false).unwrap();
		assert_eq!(e.port().status_reads, 4);
		let retry_waits = e.port().events.iter()
			.filter(|ev| **ev == Event::Sleep(200))
			.count();
		assert_eq!(retry_waits, 3);
	}

	#[test]
	fn timeout_after_exact_budget_without_data() {
		let timing = Timing::default().with_busy_retries(7);
		let mut e = Engine::new(Recorder::new(usize::max_value()), timing);
		assert_eq!(
			e.transact(Command::Erase(1), false),
			Err(DeviceError::Timeout { polls: 7 })
		);
		let rec = e.into_port();
		assert_eq!(rec.status_reads, 7);
		// only the idle level before the handshake
		assert_eq!(rec.data_out_writes(), 1);
		assert!(rec.shifted.is_empty());
		assert!(!rec.selected);
	}

	#[test]
	fn zero_budget_times_out_immediately() {
		let timing = Timing::default().with_busy_retries(0);
		let mut e = Engine::new(Recorder::new(0), timing);
		assert_eq!(e.transact(Command::WriteDisable, false), Err(DeviceError::Timeout { polls: 0 }));
		assert_eq!(e.port().status_reads, 0);
	}
}
