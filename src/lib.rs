#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

macro_rules! with_context {
	(( $fmt:tt $($t:tt)* ), $e:expr) => {{
		use failure::Error;

		match (|| { $e })() {
			Ok(v) => Ok(v),
			Err(e) => {
				let e: Error = e;
				let msg = format!(concat!($fmt, ": {}") $($t)*, e);
				Err(Error::from(e.context(msg)))
			}
		}
	}};

	($msg:expr, $e:expr) => {
		with_context!(("{}", $msg), $e)
	};
}

pub type AResult<T> = Result<T, failure::Error>;

pub mod display;
pub mod gpio;
pub mod hexfile;
pub mod microwire;
pub mod registers;
pub mod shell;

pub use self::registers::RegisterStore;

/// Configure the microwire lines, run `f` on the prepared engine and
/// release the lines afterwards (also on error).
pub fn with_engine<P, F, R>(port: P, timing: microwire::Timing, f: F) -> AResult<R>
where
	P: gpio::GpioPort,
	F: FnOnce(&mut microwire::Engine<gpio::PortGuard<P>>) -> AResult<R>,
{
	let mut engine = microwire::Engine::new(gpio::setup(port), timing);
	f(&mut engine)
}
