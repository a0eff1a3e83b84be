/// Protocol for the KM93C46 / 93C46, a 1-kbit EEPROM (organized as 64 x 16bit)
///
/// Microwire is a half-duplex subset of SPI mode 0 with separate DATA IN and
/// DATA OUT pins and an active-high CHIP SELECT.
///
/// Instructions:
/// - Startbit: "1"
/// - 2-bit Opcode
/// - 6-bit Address
///
/// WRITE and WRAL are followed by 16 DATA bits; READ answers with a dummy "0"
/// bit and 16 DATA bits.
///
/// Opcodes: (@ address)
/// - 0b00 @ 0b00????: EWDS (erase/write disable)
/// - 0b00 @ 0b01????: WRAL (write all), DATA
/// - 0b00 @ 0b10????: ERAL (erase all)
/// - 0b00 @ 0b11????: EWEN (erase/write enable)
/// - 0b01: WRITE 16-bits to address, send DATA
/// - 0b10: READ 16-bits from address, recv DATA
/// - 0b11: ERASE at address (set all bits to "1")
///
/// After an erase or write the device pulls DATA OUT low while busy; the
/// status shows up one clock cycle after CHIP SELECT is raised.

mod command;
mod engine;
mod operations;
mod timing;

pub use self::command::{
	ADDRESS_LIMIT,
	ADDRESS_WIDTH,
	Command,
	WORD_BITS,
};

pub use self::engine::{
	DeviceError,
	Engine,
};

pub use self::operations::{
	Operations,
	ProgrammingEnabled,
};

pub use self::timing::Timing;
