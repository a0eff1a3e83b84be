//! Interactive command loop: one command per line, hex parameters.

use std::fmt;
use std::io::{
	BufRead,
	Write,
};

use failure::Fail;

use crate::display::RegisterTable;
use crate::hexfile;
use crate::microwire::{
	ADDRESS_LIMIT,
	Operations,
};
use crate::registers::RegisterStore;

pub const MENU: &str = "\
Enter command and any required parameters:
  WRITE xAddr xData;   READ  xAddr;   EWEN;   EWDS;
  WRAL  xAddr xData;   ERASE xAddr;   ERAL;   ReadAll;
  ViewRegs;   Regs2File [path];   Regs2Eeprom;  or Enter to quit!";

const PROMPT: &str = "??? ";

#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum CommandError {
	#[fail(display = "empty command")]
	Empty,
	#[fail(display = "unknown command {:?}, care to try again?", name)]
	UnknownCommand {
		name: String,
	},
	#[fail(display = "{} requires {}", command, parameter)]
	MissingParameter {
		command: &'static str,
		parameter: &'static str,
	},
	#[fail(display = "{:?} is not a hex number", token)]
	InvalidHex {
		token: String,
	},
	#[fail(display = "Invalid xAddr 0x{:X} (0 <= xAddr <= 3F)", address)]
	AddressOutOfRange {
		address: u64,
	},
	#[fail(display = "Invalid xData 0x{:X} (0 <= xData <= FFFF)", data)]
	DataOutOfRange {
		data: u64,
	},
	#[fail(display = "too many parameters for {}", command)]
	TooManyParameters {
		command: &'static str,
	},
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ShellCommand {
	Read(usize),
	/// ERASE + WRITE
	Write(usize, u16),
	Erase(usize),
	WriteEnable,
	WriteDisable,
	EraseAll,
	/// ERAL + WRAL
	WriteAll(u16),
	ReadAll,
	ViewRegisters,
	/// export to the given path or a timestamped name
	RegistersToFile(Option<String>),
	RegistersToDevice,
	Quit,
}

fn parse_hex(token: &str) -> Result<u64, CommandError> {
	let digits = if token.starts_with("0x") || token.starts_with("0X") {
		&token[2..]
	} else {
		token
	};
	u64::from_str_radix(digits, 16).map_err(|_| CommandError::InvalidHex {
		token: token.to_string(),
	})
}

struct Parameters<I> {
	command: &'static str,
	tokens: I,
}

impl<'a, I: Iterator<Item = &'a str>> Parameters<I> {
	fn next_token(&mut self, parameter: &'static str) -> Result<&'a str, CommandError> {
		let command = self.command;
		self.tokens.next().ok_or(CommandError::MissingParameter { command, parameter })
	}

	fn address(&mut self) -> Result<usize, CommandError> {
		let address = parse_hex(self.next_token("xAddr")?)?;
		if address >= ADDRESS_LIMIT as u64 {
			return Err(CommandError::AddressOutOfRange { address });
		}
		Ok(address as usize)
	}

	fn data(&mut self) -> Result<u16, CommandError> {
		let data = parse_hex(self.next_token("xData")?)?;
		if data > u64::from(u16::max_value()) {
			return Err(CommandError::DataOutOfRange { data });
		}
		Ok(data as u16)
	}

	fn finish(mut self) -> Result<(), CommandError> {
		match self.tokens.next() {
			None => Ok(()),
			Some(_) => Err(CommandError::TooManyParameters { command: self.command }),
		}
	}
}

impl ShellCommand {
	/// Whitespace separated; the command name is case insensitive.
	pub fn parse(line: &str) -> Result<Self, CommandError> {
		let mut tokens = line.split_whitespace();
		let name = tokens.next().ok_or(CommandError::Empty)?;
		let lower = name.to_ascii_lowercase();
		let command: &'static str = match lower.as_str() {
			"read" => "READ",
			"write" => "WRITE",
			"erase" => "ERASE",
			"ewen" => "EWEN",
			"ewds" => "EWDS",
			"eral" => "ERAL",
			"wral" => "WRAL",
			"readall" => "READALL",
			"viewregs" => "VIEWREGS",
			"regs2file" => "REGS2FILE",
			"regs2eeprom" => "REGS2EEPROM",
			"quit" => "QUIT",
			_ => return Err(CommandError::UnknownCommand { name: name.to_string() }),
		};

		if command == "WRAL" {
			// the address in front of the data is optional and ignored
			let rest: Vec<&str> = tokens.collect();
			let mut params = Parameters { command, tokens: rest.iter().cloned() };
			if rest.len() > 1 {
				params.address()?;
			}
			let data = params.data()?;
			params.finish()?;
			return Ok(ShellCommand::WriteAll(data));
		}

		let mut params = Parameters { command, tokens };
		let result = match command {
			"READ" => ShellCommand::Read(params.address()?),
			"WRITE" => {
				let address = params.address()?;
				ShellCommand::Write(address, params.data()?)
			},
			"ERASE" => ShellCommand::Erase(params.address()?),
			"EWEN" => ShellCommand::WriteEnable,
			"EWDS" => ShellCommand::WriteDisable,
			"ERAL" => ShellCommand::EraseAll,
			"READALL" => ShellCommand::ReadAll,
			"VIEWREGS" => ShellCommand::ViewRegisters,
			"REGS2FILE" => ShellCommand::RegistersToFile(params.tokens.next().map(String::from)),
			"REGS2EEPROM" => ShellCommand::RegistersToDevice,
			_ => ShellCommand::Quit,
		};
		params.finish()?;
		Ok(result)
	}
}

impl fmt::Display for ShellCommand {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ShellCommand::Read(address) => write!(f, "READ 0x{:02X}", address),
			ShellCommand::Write(address, data) => write!(f, "WRITE 0x{:02X} 0x{:04X}", address, data),
			ShellCommand::Erase(address) => write!(f, "ERASE 0x{:02X}", address),
			ShellCommand::WriteEnable => write!(f, "EWEN"),
			ShellCommand::WriteDisable => write!(f, "EWDS"),
			ShellCommand::EraseAll => write!(f, "ERAL"),
			ShellCommand::WriteAll(data) => write!(f, "WRAL 0x{:04X}", data),
			ShellCommand::ReadAll => write!(f, "READALL"),
			ShellCommand::ViewRegisters => write!(f, "VIEWREGS"),
			ShellCommand::RegistersToFile(Some(path)) => write!(f, "REGS2FILE {}", path),
			ShellCommand::RegistersToFile(None) => write!(f, "REGS2FILE"),
			ShellCommand::RegistersToDevice => write!(f, "REGS2EEPROM"),
			ShellCommand::Quit => write!(f, "QUIT"),
		}
	}
}

/// The host image plus the device it belongs to.
pub struct Shell<'a, H: ?Sized + Operations + 'a> {
	device: &'a mut H,
	registers: RegisterStore,
}

impl<'a, H: ?Sized + Operations> Shell<'a, H> {
	pub fn new(device: &'a mut H, registers: RegisterStore) -> Self {
		Shell {
			device,
			registers,
		}
	}

	pub fn registers(&self) -> &RegisterStore {
		&self.registers
	}

	pub fn into_registers(self) -> RegisterStore {
		self.registers
	}

	/// Run a single command; `Quit` is a no-op here.
	pub fn execute<W: Write>(&mut self, command: &ShellCommand, out: &mut W) -> crate::AResult<()> {
		debug!("shell: {}", command);
		match *command {
			ShellCommand::Read(address) => {
				let word = self.device.read(address)?;
				self.registers.set(address, word);
				writeln!(out, "Address 0x{:02X} contains 0x{:04X}.", address, word)?;
			},
			ShellCommand::Write(address, data) => {
				self.registers.set(address, data);
				self.device.write(address, data)?;
			},
			ShellCommand::Erase(address) => self.device.erase(address)?,
			ShellCommand::WriteEnable => self.device.write_enable()?,
			ShellCommand::WriteDisable => self.device.write_disable()?,
			ShellCommand::EraseAll => self.device.erase_all()?,
			ShellCommand::WriteAll(data) => {
				self.registers.fill(data);
				self.device.write_all(data)?;
			},
			ShellCommand::ReadAll => {
				let result = self.device.read_all(&mut self.registers);
				write!(out, "{}", RegisterTable(&self.registers))?;
				result?;
			},
			ShellCommand::ViewRegisters => write!(out, "{}", RegisterTable(&self.registers))?,
			ShellCommand::RegistersToFile(ref path) => {
				let path = match path {
					Some(path) => path.clone(),
					None => hexfile::default_file_name(&chrono::Local::now()),
				};
				hexfile::write_file(&self.registers, &path)?;
				info!("Created {} containing the registers image", path);
				writeln!(out, "Created {} containing the registers image.", path)?;
			},
			ShellCommand::RegistersToDevice => self.device.push_image(&self.registers)?,
			ShellCommand::Quit => (),
		}
		Ok(())
	}

	/// Read commands until an empty line, `QUIT` or end of input.
	///
	/// Bad commands and failed operations are reported on `out` and don't
	/// stop the loop; only I/O errors on `input` / `out` do.
	pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> crate::AResult<()> {
		writeln!(out, "{}", MENU)?;
		let mut line = String::new();
		loop {
			write!(out, "{}", PROMPT)?;
			out.flush()?;
			line.clear();
			if input.read_line(&mut line)? == 0 {
				break;
			}

			let command = match ShellCommand::parse(&line) {
				Ok(ShellCommand::Quit) | Err(CommandError::Empty) => break,
				Ok(command) => command,
				Err(e) => {
					writeln!(out, "{}", e)?;
					if let CommandError::UnknownCommand { .. } = e {
						writeln!(out, "{}", MENU)?;
					}
					continue;
				},
			};

			if let Err(e) = self.execute(&command, &mut out) {
				error!("{} failed: {}", command, e);
				writeln!(out, "{} failed: {}", command, e)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gpio::sim::SimulatedEeprom;
	use crate::microwire::{
		Engine,
		Timing,
	};

	#[test]
	fn parse_commands() {
		assert_eq!(ShellCommand::parse("read 3F"), Ok(ShellCommand::Read(0x3f)));
		assert_eq!(ShellCommand::parse("  Write 0x12  cafe\n"), Ok(ShellCommand::Write(0x12, 0xcafe)));
		assert_eq!(ShellCommand::parse("WRAL 5 0102"), Ok(ShellCommand::WriteAll(0x0102)));
		assert_eq!(ShellCommand::parse("wral ffff"), Ok(ShellCommand::WriteAll(0xffff)));
		assert_eq!(ShellCommand::parse("ReadAll"), Ok(ShellCommand::ReadAll));
		assert_eq!(ShellCommand::parse("regs2file"), Ok(ShellCommand::RegistersToFile(None)));
		assert_eq!(
			ShellCommand::parse("regs2file out.hex"),
			Ok(ShellCommand::RegistersToFile(Some("out.hex".to_string())))
		);
		assert_eq!(ShellCommand::parse("quit"), Ok(ShellCommand::Quit));
	}

	#[test]
	fn parse_errors() {
		assert_eq!(ShellCommand::parse(" \r\n"), Err(CommandError::Empty));
		assert_eq!(
			ShellCommand::parse("frob 1"),
			Err(CommandError::UnknownCommand { name: "frob".to_string() })
		);
		assert_eq!(
			ShellCommand::parse("write 1"),
			Err(CommandError::MissingParameter { command: "WRITE", parameter: "xData" })
		);
		assert_eq!(
			ShellCommand::parse("read xyz"),
			Err(CommandError::InvalidHex { token: "xyz".to_string() })
		);
		assert_eq!(
			ShellCommand::parse("read 40"),
			Err(CommandError::AddressOutOfRange { address: 0x40 })
		);
		assert_eq!(
			ShellCommand::parse("write 0 10000"),
			Err(CommandError::DataOutOfRange { data: 0x10000 })
		);
		assert_eq!(
			ShellCommand::parse("wral 40 0"),
			Err(CommandError::AddressOutOfRange { address: 0x40 })
		);
		assert_eq!(
			ShellCommand::parse("ewen 1"),
			Err(CommandError::TooManyParameters { command: "EWEN" })
		);
	}

	#[test]
	fn loop_keeps_going_after_errors() {
		let mut sim = SimulatedEeprom::new();
		let mut engine = Engine::new(&mut sim, Timing::default());
		let mut shell = Shell::new(&mut engine, RegisterStore::new());
		let input = b"bogus\nread 40\newen\nwrite 2 beef\nread 2\n\nread 3\n";
		let mut out = Vec::new();
		shell.run(&input[..], &mut out).unwrap();
		let out = String::from_utf8(out).unwrap();

		assert!(out.contains("unknown command \"bogus\""));
		assert!(out.contains("Invalid xAddr 0x40"));
		assert!(out.contains("Address 0x02 contains 0xBEEF."));
		// stopped at the empty line
		assert!(!out.contains("Address 0x03"));
		assert_eq!(shell.registers().get(2), Some(0xbeef));
		assert_eq!(shell.registers().populated_count(), 1);
	}

	#[test]
	fn device_failure_is_reported() {
		let mut sim = SimulatedEeprom::new();
		sim.set_stuck_busy(true);
		let mut engine = Engine::new(&mut sim, Timing::default().with_busy_retries(2));
		let mut shell = Shell::new(&mut engine, RegisterStore::new());
		let mut out = Vec::new();
		shell.run(&b"read 1\nviewregs\nquit\n"[..], &mut out).unwrap();
		let out = String::from_utf8(out).unwrap();
		assert!(out.contains("READ 0x01 failed: EEPROM timeout"));
		assert!(out.contains(crate::display::HEADER));
		assert_eq!(shell.registers().populated_count(), 0);
	}

	#[test]
	fn wral_fills_store_and_device() {
		let mut sim = SimulatedEeprom::new();
		{
			let mut engine = Engine::new(&mut sim, Timing::default());
			let mut shell = Shell::new(&mut engine, RegisterStore::new());
			let mut out = Vec::new();
			for line in &["EWEN", "WRAL 0 1234", "EWDS"] {
				let command = ShellCommand::parse(line).unwrap();
				shell.execute(&command, &mut out).unwrap();
			}
			assert!(shell.registers().all_populated());
			assert_eq!(shell.registers().get(0x3f), Some(0x1234));
		}
		assert!(sim.words().iter().all(|w| *w == 0x1234));
		assert!(!sim.is_write_enabled());
	}

	#[test]
	fn export_refused_until_read_all() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("regs.hex");
		let path = path.to_str().unwrap().to_string();

		let mut sim = SimulatedEeprom::with_words([0x6b62; 64]);
		let mut engine = Engine::new(&mut sim, Timing::default());
		let mut shell = Shell::new(&mut engine, RegisterStore::new());
		let export = ShellCommand::RegistersToFile(Some(path.clone()));
		let mut out = Vec::new();

		let err = shell.execute(&export, &mut out).unwrap_err();
		assert!(err.downcast_ref::<hexfile::ImageError>().is_some());
		assert!(!dir.path().join("regs.hex").exists());

		shell.execute(&ShellCommand::ReadAll, &mut out).unwrap();
		shell.execute(&export, &mut out).unwrap();
		let image = hexfile::read_file(&path).unwrap();
		assert_eq!(&image.registers, shell.registers());
	}
}
