/// Minimum delays in microseconds; hosts may always wait longer.
///
/// Datasheet parameters covered by each value are listed next to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Timing {
	/// lines idle before the first chip select
	pub settle_us: u32,
	/// tDIS, tSKL, tCSS, tPD: data setup / clock low
	pub clock_low_us: u32,
	/// tDIH, tSKH, tDH: clock high
	pub clock_high_us: u32,
	/// device deselected between two busy polls
	pub busy_retry_us: u32,
	/// tCSH: chip select held after the last clock
	pub cs_hold_us: u32,
	/// tCS, tDF: chip select low before the next transaction
	pub cs_deselect_us: u32,
	/// busy polls before giving up; 111 polls cover more than 22ms
	pub busy_retries: u32,
}

impl Default for Timing {
	fn default() -> Self {
		Timing {
			settle_us: 2,
			clock_low_us: 2,
			clock_high_us: 2,
			busy_retry_us: 200,
			cs_hold_us: 1,
			cs_deselect_us: 1,
			busy_retries: 111,
		}
	}
}

impl Timing {
	pub fn with_busy_retries(mut self, retries: u32) -> Self {
		self.busy_retries = retries;
		self
	}

	/// lower bound of the time spent polling a device that never gets ready
	pub fn worst_case_poll_us(&self) -> u64 {
		self.busy_retries as u64 * (
			self.clock_low_us as u64
			+ self.clock_high_us as u64
			+ self.busy_retry_us as u64
		)
	}
}
