#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate uwire_eeprom;
use uwire_eeprom::*;

use std::io;
use std::process::exit;

use uwire_eeprom::display::RegisterTable;
use uwire_eeprom::gpio::{
	GpioPort,
	PinMap,
};
use uwire_eeprom::hexfile::ParsedImage;
use uwire_eeprom::microwire::{
	Operations,
	Timing,
};
use uwire_eeprom::shell::Shell;

fn get_param<T>(matches: &clap::ArgMatches, name: &str, default: T) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => return Ok(default),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn cli() -> clap::App<'static, 'static> {
	clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg backend: -b --backend +takes_value "GPIO access: gpiomem (default), sysfs or simulate")
		(@arg cs: --cs +takes_value "GPIO number for chip select (default 8)")
		(@arg clk: --clk +takes_value "GPIO number for the clock (default 11)")
		(@arg mosi: --mosi +takes_value "GPIO number for data to the EEPROM (default 10)")
		(@arg miso: --miso +takes_value "GPIO number for data from the EEPROM (default 9)")
		(@arg retries: --retries +takes_value "busy polls before a command times out (default 111)")
		(@arg verbose: -v +multiple "more logging (debug, then trace)")
		(@subcommand shell =>
			(about: "interactive EEPROM commands")
			(@arg HEXFILE: "register image to start with")
		)
		(@subcommand dump =>
			(about: "read all registers and save them as register image")
			(@arg output: -o --output +takes_value "file name (default: uWire.<date>.<time>.hex)")
		)
		(@subcommand flash =>
			(about: "erase the EEPROM, write a register image and verify it")
			(@arg HEXFILE: +required "register image to flash")
		)
		(@subcommand check =>
			(about: "parse a register image and show it")
			(@arg HEXFILE: +required "register image to check")
		)
	).arg(clap::Arg::with_name("sysfs_base")
		.long("sysfs-base")
		.takes_value(true)
		.help("sysfs GPIO directory (default /sys/class/gpio)")
	)
}

fn load_image(path: &str) -> AResult<ParsedImage> {
	let image = hexfile::read_file(path)?;
	if !image.eof_record {
		warn!("{}: no EOF record", path);
	}
	info!("Initialized registers from {}[{}]: {} of {} set, {} invalid records",
		path, image.lines, image.registers.populated_count(), registers::REGISTER_COUNT, image.diagnostics.len()
	);
	Ok(image)
}

fn run_device<P: GpioPort>(port: P, timing: Timing, matches: &clap::ArgMatches) -> AResult<()> {
	match matches.subcommand() {
		("shell", Some(sub_m)) => {
			let registers = match sub_m.value_of("HEXFILE") {
				Some(path) => load_image(path)?.registers,
				None => RegisterStore::new(),
			};
			with_engine(port, timing, |engine| {
				let stdin = io::stdin();
				let mut shell = Shell::new(engine, registers);
				shell.run(stdin.lock(), io::stdout())
			})
		},
		("dump", Some(sub_m)) => {
			let path = match sub_m.value_of("output") {
				Some(path) => path.to_string(),
				None => hexfile::default_file_name(&chrono::Local::now()),
			};
			let mut registers = RegisterStore::new();
			with_engine(port, timing, |engine| engine.read_all(&mut registers))?;
			print!("{}", RegisterTable(&registers));
			hexfile::write_file(&registers, &path)?;
			info!("Created {} containing the registers image", path);
			Ok(())
		},
		("flash", Some(sub_m)) => {
			let path = sub_m.value_of("HEXFILE").unwrap_or_default();
			let image = load_image(path)?;
			ensure!(image.diagnostics.is_empty(),
				"{}: {} invalid records, not flashing", path, image.diagnostics.len()
			);
			hexfile::check_complete(&image.registers)?;
			with_engine(port, timing, |engine| engine.flash_image(&image.registers))?;
			info!("Flashed and verified {}", path);
			Ok(())
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main_app(matches: &clap::ArgMatches) -> AResult<()> {
	if let ("check", Some(sub_m)) = matches.subcommand() {
		let path = sub_m.value_of("HEXFILE").unwrap_or_default();
		let image = load_image(path)?;
		for diagnostic in &image.diagnostics {
			println!("{}", diagnostic);
		}
		print!("{}", RegisterTable(&image.registers));
		ensure!(image.diagnostics.is_empty(), "{} invalid records", image.diagnostics.len());
		return Ok(());
	}

	let defaults = PinMap::default();
	let pins = PinMap {
		chip_select: get_param(matches, "cs", defaults.chip_select)?,
		clock: get_param(matches, "clk", defaults.clock)?,
		data_out: get_param(matches, "mosi", defaults.data_out)?,
		data_in: get_param(matches, "miso", defaults.data_in)?,
	};
	let timing = Timing::default();
	let timing = timing.with_busy_retries(get_param(matches, "retries", timing.busy_retries)?);

	match matches.value_of("backend").unwrap_or("gpiomem") {
		"gpiomem" => {
			info!("Using {} ({})", gpio::linux::GPIOMEM_PATH, pins);
			run_device(gpio::linux::open_gpiomem(pins)?, timing, matches)
		},
		"sysfs" => {
			let base = matches.value_of("sysfs_base").unwrap_or(gpio::linux::SYSFS_GPIO_PATH);
			info!("Using {} ({})", base, pins);
			run_device(gpio::linux::open_sysfs(base, pins)?, timing, matches)
		},
		"simulate" => {
			warn!("Using a simulated EEPROM, nothing reaches any hardware");
			run_device(gpio::sim::SimulatedEeprom::new(), timing, matches)
		},
		other => bail!("unknown backend {:?} (gpiomem, sysfs or simulate)", other),
	}
}

fn main() {
	let matches = cli().get_matches();
	let level = match matches.occurrences_of("verbose") {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	env_logger::from_env(env_logger::Env::default().default_filter_or(level)).init();

	if let Err(e) = main_app(&matches) {
		error!("Error: {}", e);
		exit(1);
	}
}
