#[macro_use] extern crate rocket;
#[macro_use] extern crate serde_derive;

use std::path::Path;

use clap::{Command, Arg, ArgAction};
use rocket::{Build, Request, Response, Rocket};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::figment::Figment;
use rocket::figment::providers::{Env, Format, Toml};
use rocket::http::Header;

mod auth;
mod common;
mod error;
mod geo;
mod rest_api;
mod store;
mod validation;



// The map UI is served by another server, so it needs CORS to call this one.
pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
	fn info(&self) -> Info {
		Info {
			name: "Add CORS headers to responses",
			kind: Kind::Response
		}
	}

	async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
		response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
		response.set_header(Header::new("Access-Control-Allow-Methods", "POST, GET, DELETE, OPTIONS"));
		response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
		response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
	}
}

pub fn build(figment: Figment) -> Rocket<Build> {
	rocket::custom(figment)
		.attach(rest_api::stage())
		.attach(CORS)
}

/// Rocket's own sources (`Rocket.toml`, `ROCKET_*`), then each `--config` file
/// in order, then `URBANEYE_*` variables (`__` separates nested keys).
fn load_figment<'a>(config_files: impl Iterator<Item = &'a String>) -> anyhow::Result<Figment> {
	let mut figment = rocket::Config::figment();
	for filename in config_files {
		if !Path::new(filename).is_file() {
			anyhow::bail!("config file {} does not exist", filename);
		}
		figment = figment.merge(Toml::file(filename).nested());
	}
	Ok(figment.merge(Env::prefixed("URBANEYE_").split("__")))
}


#[rocket::main]
async fn main() -> anyhow::Result<()> {
	let matches = Command::new("urbaneye")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Registry of surveillance cameras and their locations.")
		.arg(
			Arg::new("config")
				.action(ArgAction::Append)	// Allow argument to be specified multiple times
				.short('c')
				.long("config")
				.help("TOML file with UrbanEye config")
		)
		.get_matches();

	let config_files = matches.get_many::<String>("config").into_iter().flatten();
	let figment = load_figment(config_files)?;

	build(figment)
		.launch()
		.await?;

	anyhow::Ok(())
}
