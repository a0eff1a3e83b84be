mod mapped;
mod sysfs;

pub use self::mapped::GpioMem;
pub use self::sysfs::SysfsGpio;

use crate::gpio::PinMap;

pub const GPIOMEM_PATH: &str = "/dev/gpiomem";
pub const SYSFS_GPIO_PATH: &str = "/sys/class/gpio";

/// Broadcom GPIO block through `/dev/gpiomem` (no root needed, group `gpio`)
pub fn open_gpiomem(pins: PinMap) -> crate::AResult<GpioMem> {
	pins.validate()?;
	with_context!(("open {}", GPIOMEM_PATH),
		mapped::inner_open(GPIOMEM_PATH, pins)
	)
}

/// Legacy sysfs interface; exports the lines while the port is open
pub fn open_sysfs(base: &str, pins: PinMap) -> crate::AResult<SysfsGpio> {
	pins.validate()?;
	sysfs::inner_open(base.into(), pins)
}
