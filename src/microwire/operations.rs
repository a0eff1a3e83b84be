use crate::gpio::GpioPort;
use crate::registers::{
	ERASED,
	REGISTER_COUNT,
	RegisterStore,
};

use super::{
	ADDRESS_LIMIT,
	Command,
	Engine,
};

mod inner {
	use super::*;

	pub trait OperationsBase {
		type Port: GpioPort;

		fn engine(&mut self) -> &mut Engine<Self::Port>;

		fn send(&mut self, command: Command) -> crate::AResult<()> {
			self.engine().transact(command, command.responds())?;
			Ok(())
		}
	}

	impl<P: GpioPort> OperationsBase for Engine<P> {
		type Port = P;

		fn engine(&mut self) -> &mut Engine<P> {
			self
		}
	}
}

fn register_address(address: usize) -> u8 {
	assert!(address < ADDRESS_LIMIT);
	address as u8
}

/// One call per user operation; every call is one or two complete
/// transactions.
pub trait Operations: inner::OperationsBase {
	fn read(&mut self, address: usize) -> crate::AResult<u16> {
		let command = Command::Read(register_address(address));
		match self.engine().transact(command, command.responds())? {
			Some(word) => Ok(word),
			None => bail!("{} returned no data", command),
		}
	}

	/// plain WRITE; the cell should be erased before
	fn program(&mut self, address: usize, word: u16) -> crate::AResult<()> {
		self.send(Command::Write(register_address(address), word))
	}

	// the datasheet requires an ERASE before a WRITE
	fn write(&mut self, address: usize, word: u16) -> crate::AResult<()> {
		self.erase(address)?;
		self.program(address, word)
	}

	fn erase(&mut self, address: usize) -> crate::AResult<()> {
		self.send(Command::Erase(register_address(address)))
	}

	fn erase_all(&mut self) -> crate::AResult<()> {
		self.send(Command::EraseAll)
	}

	// write one word into all addresses; includes erasing before
	fn write_all(&mut self, word: u16) -> crate::AResult<()> {
		self.erase_all()?;
		self.send(Command::WriteAll(word))
	}

	fn write_enable(&mut self) -> crate::AResult<()> {
		self.send(Command::WriteEnable)
	}

	fn write_disable(&mut self) -> crate::AResult<()> {
		self.send(Command::WriteDisable)
	}

	/// Read every register into `store`; a failed address keeps its old
	/// content and doesn't stop the others.
	fn read_all(&mut self, store: &mut RegisterStore) -> crate::AResult<()> {
		let mut failed = 0;
		for address in 0..REGISTER_COUNT {
			match self.read(address) {
				Ok(word) => store.set(address, word),
				Err(e) => {
					error!("Read of address 0x{:02X} failed: {}", address, e);
					failed += 1;
				},
			}
		}
		ensure!(failed == 0, "{} of {} registers could not be read", failed, REGISTER_COUNT);
		Ok(())
	}

	/// WRITE every register in address order, stop at the first failure
	///
	/// Registers never loaded or read are written as erased (0xFFFF). The
	/// failure names the registers processed, including the failed one.
	fn push_image(&mut self, store: &RegisterStore) -> crate::AResult<()> {
		let missing = REGISTER_COUNT - store.populated_count();
		if missing > 0 {
			warn!("{} registers not initialized, writing them as 0x{:04X}", missing, ERASED);
		}
		for address in 0..REGISTER_COUNT {
			let word = store.get(address).unwrap_or(ERASED);
			if let Err(e) = self.program(address, word) {
				bail!("Incomplete update, {} registers processed: {}", address + 1, e);
			}
		}
		Ok(())
	}

	/// Erase the device, write all registers and read them back.
	fn flash_image(&mut self, store: &RegisterStore) -> crate::AResult<()> {
		{
			let mut prog = self.start_programming()?;
			prog.erase_all()?;
			for address in 0..REGISTER_COUNT {
				prog.program(address, store.get(address).unwrap_or(ERASED))?;
			}
		}
		for address in 0..REGISTER_COUNT {
			let expected = store.get(address).unwrap_or(ERASED);
			let flash = self.read(address)?;
			ensure!(flash == expected,
				"Verify failed at {:02x}: expected {:04x}, flash is {:04x}", address, expected, flash
			);
		}
		Ok(())
	}

	/// EWEN now, EWDS when the returned guard goes out of scope
	fn start_programming(&mut self) -> crate::AResult<ProgrammingEnabled<Self>>;
}

impl<P: GpioPort> Operations for Engine<P> {
	fn start_programming(&mut self) -> crate::AResult<ProgrammingEnabled<Self>> {
		self.write_enable()?;
		Ok(ProgrammingEnabled(self, true))
	}
}

pub struct ProgrammingEnabled<'a, H: ?Sized + Operations + 'a>(&'a mut H, bool);

impl<'a, H: ?Sized + Operations> Drop for ProgrammingEnabled<'a, H> {
	fn drop(&mut self) {
		if self.1 {
			if let Err(e) = self.0.write_disable() {
				error!("Couldn't disable Erase/Write mode: {}", e);
			}
		}
	}
}

impl<'a, H: ?Sized + Operations> inner::OperationsBase for ProgrammingEnabled<'a, H> {
	type Port = H::Port;

	fn engine(&mut self) -> &mut Engine<Self::Port> {
		self.0.engine()
	}
}

impl<'a, H: ?Sized + Operations> Operations for ProgrammingEnabled<'a, H> {
	fn start_programming(&mut self) -> crate::AResult<ProgrammingEnabled<Self>> {
		Ok(ProgrammingEnabled(self, false))
	}
}
