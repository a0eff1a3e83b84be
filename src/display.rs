use std::fmt;

use crate::registers::RegisterStore;

const COLUMNS: usize = 8;

pub const HEADER: &str = "ADDR   +0   +1   +2   +3   +4   +5   +6   +7   |...as..char...|";

fn printable(b: u8) -> char {
	if b == b' ' || b.is_ascii_graphic() {
		b as char
	} else {
		'.'
	}
}

/// Register image as 8 rows of 8 words plus the bytes as text (low byte
/// first); registers with unknown content stay blank.
pub struct RegisterTable<'a>(pub &'a RegisterStore);

impl<'a> fmt::Display for RegisterTable<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "{}", HEADER)?;
		let registers: Vec<Option<u16>> = self.0.iter().map(|(_, value)| value).collect();
		for (row, chunk) in registers.chunks(COLUMNS).enumerate() {
			let mut text = String::with_capacity(2 * COLUMNS);
			write!(f, "0x{:02X} ", row * COLUMNS)?;
			for value in chunk {
				match value {
					Some(value) => {
						write!(f, " {:04X}", value)?;
						let [low, high] = value.to_le_bytes();
						text.push(printable(low));
						text.push(printable(high));
					},
					None => {
						f.write_str("     ")?;
						text.push_str("  ");
					},
				}
			}
			writeln!(f, "  {}", text)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_store_has_blank_rows() {
		let table = RegisterTable(&RegisterStore::new()).to_string();
		let lines: Vec<&str> = table.lines().collect();
		assert_eq!(lines.len(), 9);
		assert_eq!(lines[0], HEADER);
		assert_eq!(lines[1].trim_end(), "0x00");
		assert_eq!(lines[8].trim_end(), "0x38");
		assert_eq!(lines[1].len(), 4 + 1 + 5 * 8 + 2 + 16);
	}

	#[test]
	fn words_and_text() {
		let mut store = RegisterStore::new();
		for (i, word) in [0x2020, 0x2020, 0x7520, 0x6957, 0x6572, 0x2020, 0x2020, 0x2020].iter().enumerate() {
			store.set(0x10 + i, *word);
		}
		store.set(0x38, 0x0a41);
		let table = RegisterTable(&store).to_string();
		let lines: Vec<&str> = table.lines().collect();
		assert_eq!(lines[3], "0x10  2020 2020 7520 6957 6572 2020 2020 2020       uWire      ");
		// half populated row keeps its columns
		assert_eq!(lines[8], format!("0x38  0A41{}  A.{}", " ".repeat(35), " ".repeat(14)));
	}
}
