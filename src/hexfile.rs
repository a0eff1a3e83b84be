//! Register image files: one checksummed record per register.
//!
//! ```text
//! :LLAAAATTBBBBCC   data record: length 02, address, type 00, low byte,
//!                   high byte, checksum
//! :00000001FF       end of file
//! ```
//!
//! The checksum makes the low byte of the sum over all record bytes zero.

use std::fmt;
use std::fs;
use std::io::{
	BufRead,
	BufReader,
	Write,
};
use std::path::Path;

use chrono::{
	DateTime,
	TimeZone,
};
use failure::Fail;

use crate::registers::{
	ERASED,
	REGISTER_COUNT,
	RegisterStore,
};

pub const EOF_RECORD: &str = ":00000001FF";

const DATA_RECORD_LEN: usize = 15;
const EOF_RECORD_LEN: usize = 11;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DiagnosticKind {
	NonHexCharacter,
	MissingColonPrefix,
	WrongRecordLength,
	/// bad length/type field, address out of range or checksum mismatch
	InvalidDataRecord,
	InvalidEofRecord,
}

impl DiagnosticKind {
	pub fn description(&self) -> &'static str {
		match self {
			DiagnosticKind::NonHexCharacter => "non-hex digit",
			DiagnosticKind::MissingColonPrefix => "missing ':'",
			DiagnosticKind::WrongRecordLength => "wrong line length",
			DiagnosticKind::InvalidDataRecord => "invalid data record",
			DiagnosticKind::InvalidEofRecord => "bad EOF record",
		}
	}
}

/// A rejected line; parsing continues with the next one.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseDiagnostic {
	pub kind: DiagnosticKind,
	/// 1-based
	pub line: usize,
	/// line content without trailing control characters
	pub record: String,
}

impl fmt::Display for ParseDiagnostic {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "parse error, {}, line #={}, record={}", self.kind.description(), self.line, self.record)
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParsedImage {
	pub registers: RegisterStore,
	pub diagnostics: Vec<ParseDiagnostic>,
	/// lines looked at, including the EOF record
	pub lines: usize,
	pub eof_record: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum ImageError {
	#[fail(display = "All registers not initialized ({} of {}), issue READALL before REGS2FILE", populated, total)]
	Incomplete {
		populated: usize,
		total: usize,
	},
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct DataRecord {
	address: usize,
	value: u16,
}

fn hex_byte(s: &str) -> Option<u8> {
	u8::from_str_radix(s, 16).ok()
}

// `record` is 15 characters, all hex digits after the ':'
fn parse_data_record(record: &str) -> Option<DataRecord> {
	let length = hex_byte(record.get(1..3)?)?;
	let address = u16::from_str_radix(record.get(3..7)?, 16).ok()?;
	let record_type = hex_byte(record.get(7..9)?)?;
	let byte1 = hex_byte(record.get(9..11)?)?;
	let byte2 = hex_byte(record.get(11..13)?)?;
	let checksum = hex_byte(record.get(13..15)?)?;

	let sum = [length, (address >> 8) as u8, address as u8, record_type, byte1, byte2, checksum]
		.iter()
		.fold(0u8, |sum, b| sum.wrapping_add(*b));

	if length != 2 || address as usize >= REGISTER_COUNT || record_type != 0 || sum != 0 {
		return None;
	}
	Some(DataRecord {
		address: address as usize,
		value: u16::from_le_bytes([byte1, byte2]),
	})
}

enum Record {
	Data(DataRecord),
	Eof,
}

fn parse_record(line: &str) -> Result<Record, DiagnosticKind> {
	// everything but the first character has to be a hex digit
	if !line.bytes().skip(1).all(|b| b.is_ascii_hexdigit()) {
		return Err(DiagnosticKind::NonHexCharacter);
	}
	if !line.starts_with(':') {
		return Err(DiagnosticKind::MissingColonPrefix);
	}
	match line.len() {
		DATA_RECORD_LEN => parse_data_record(line)
			.map(Record::Data)
			.ok_or(DiagnosticKind::InvalidDataRecord),
		EOF_RECORD_LEN => {
			if line.eq_ignore_ascii_case(EOF_RECORD) {
				Ok(Record::Eof)
			} else {
				Err(DiagnosticKind::InvalidEofRecord)
			}
		},
		_ => Err(DiagnosticKind::WrongRecordLength),
	}
}

/// Load records into an existing image; lines after the EOF record are not
/// looked at.
pub fn parse_into<I, S>(store: &mut RegisterStore, lines: I) -> ParsedImage
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut diagnostics = Vec::new();
	let mut count = 0;
	let mut eof_record = false;

	for line in lines {
		count += 1;
		let line = line.as_ref().trim_end_matches(|c: char| c.is_control());
		match parse_record(line) {
			Ok(Record::Data(record)) => store.set(record.address, record.value),
			Ok(Record::Eof) => {
				eof_record = true;
				break;
			},
			Err(kind) => {
				let diagnostic = ParseDiagnostic {
					kind,
					line: count,
					record: line.to_string(),
				};
				warn!("{}", diagnostic);
				diagnostics.push(diagnostic);
			},
		}
	}

	ParsedImage {
		registers: store.clone(),
		diagnostics,
		lines: count,
		eof_record,
	}
}

pub fn parse<I, S>(lines: I) -> ParsedImage
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	parse_into(&mut RegisterStore::new(), lines)
}

pub fn data_record(address: usize, value: u16) -> String {
	assert!(address < REGISTER_COUNT);
	let [byte1, byte2] = value.to_le_bytes();
	let sum = 2u8
		.wrapping_add(address as u8)
		.wrapping_add(byte1)
		.wrapping_add(byte2);
	format!(":02{:04X}00{:02X}{:02X}{:02X}", address, byte1, byte2, sum.wrapping_neg())
}

/// All 64 data records in address order plus the EOF record; unknown
/// registers are written as erased.
pub fn serialize(store: &RegisterStore) -> Vec<String> {
	let mut lines: Vec<String> = store
		.iter()
		.map(|(address, value)| data_record(address, value.unwrap_or(ERASED)))
		.collect();
	lines.push(EOF_RECORD.to_string());
	lines
}

/// refuse exporting an image with registers that were never read or written
pub fn check_complete(store: &RegisterStore) -> Result<(), ImageError> {
	if store.all_populated() {
		Ok(())
	} else {
		Err(ImageError::Incomplete {
			populated: store.populated_count(),
			total: REGISTER_COUNT,
		})
	}
}

pub fn read_file<P: AsRef<Path>>(path: P) -> crate::AResult<ParsedImage> {
	let path = path.as_ref();
	with_context!(("read {}", path.display()), {
		let reader = BufReader::new(fs::File::open(path)?);
		// invalid UTF-8 turns into U+FFFD and gets reported as non-hex for
		// that line only
		let mut lines = Vec::new();
		for line in reader.split(b'\n') {
			lines.push(String::from_utf8_lossy(&line?).into_owned());
		}
		Ok(parse(lines))
	})
}

/// Write the image; nothing is created if the image isn't complete.
pub fn write_file<P: AsRef<Path>>(store: &RegisterStore, path: P) -> crate::AResult<()> {
	check_complete(store)?;

	let path = path.as_ref();
	let mut content = serialize(store).join("\n");
	content.push('\n');
	with_context!(("write {}", path.display()), {
		fs::File::create(path)?.write_all(content.as_bytes())?;
		Ok(())
	})
}

pub fn default_file_name<Tz>(now: &DateTime<Tz>) -> String
where
	Tz: TimeZone,
	Tz::Offset: fmt::Display,
{
	now.format("uWire.%Y%m%d.%H%M%S.hex").to_string()
}
