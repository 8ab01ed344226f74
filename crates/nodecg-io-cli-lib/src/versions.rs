//! Released nodecg-io versions and the services each of them ships.
//!
//! To support a new release (its packages must already be published):
//! add its service table, extend [`SUPPORTED_RANGE`] and add the table to `service_table`.

pub const CORE_PACKAGE: &str = "nodecg-io-core";
pub const DASHBOARD_PACKAGE: &str = "nodecg-io-dashboard";
/// The dashboard is shipped inside the core package directory.
pub const DASHBOARD_PATH: &str = "nodecg-io-core/dashboard";
pub const DEVELOPMENT_VERSION: &str = "development";

pub const CORE_PACKAGES: [&str; 2] = [CORE_PACKAGE, DASHBOARD_PACKAGE];

/// Releases of nodecg-io this cli knows how to install.
pub const SUPPORTED_RANGE: &str = "<=0.2";

/// Services of a release with the name of the client type they provide.
type ServiceTable = &'static [(&'static str, &'static str)];

const VERSION_01_SERVICES: ServiceTable = &[
	("ahk", "AHKServiceClient"),
	("android", "AndroidServiceClient"),
	("curseforge", "CurseForgeClient"),
	("discord", "DiscordServiceClient"),
	("intellij", "IntelliJServiceClient"),
	("irc", "IRCServiceClient"),
	("midi-input", "MidiInputServiceClient"),
	("midi-output", "MidiOutputServiceClient"),
	("nanoleaf", "NanoleafServiceClient"),
	("obs", "OBSServiceClient"),
	("philipshue", "PhilipsHueServiceClient"),
	("rcon", "RconServiceClient"),
	("reddit", "RedditServiceClient"),
	("sacn-receiver", "SacnReceiverServiceClient"),
	("sacn-sender", "SacnSenderServiceClient"),
	("serial", "SerialServiceClient"),
	("slack", "SlackServiceClient"),
	("spotify", "SpotifyServiceClient"),
	("streamdeck", "StreamdeckServiceClient"),
	("streamelements", "StreamElementsServiceClient"),
	("telegram", "TelegramServiceClient"),
	("tiane", "TianeServiceClient"),
	("twitch-addons", "TwitchAddonsClient"),
	("twitch-api", "TwitchApiServiceClient"),
	("twitch-chat", "TwitchChatServiceClient"),
	("twitch-pubsub", "TwitchPubSubServiceClient"),
	("twitter", "TwitterServiceClient"),
	("websocket-client", "WSClientServiceClient"),
	("websocket-server", "WSServerServiceClient"),
	("xdotool", "XdotoolServiceClient"),
	("youtube", "YoutubeServiceClient"),
];

const VERSION_02_ADDED: ServiceTable = &[
	("artnet", "ArtNetServiceClient"),
	("atem", "AtemServiceClient"),
	("dbus", "DBusClient"),
	("debug", "DebugHelper"),
	("discord-rpc", "DiscordRpcClient"),
	("elgato-light", "ElgatoLightClient"),
	("googleapis", "GoogleApisServiceClient"),
	("github", "GitHubClient"),
	("mqtt-client", "MQTTClientServiceClient"),
	("shlink", "ShlinkServiceClient"),
	("sql", "SQLClient"),
];

const VERSION_02_REMOVED: &[&str] = &["youtube"];

fn service_table(version: &str) -> crate::Result<Vec<(&'static str, &'static str)>> {
	match version {
		"0.1" => Ok(VERSION_01_SERVICES.to_vec()),
		"0.2" => Ok(VERSION_01_SERVICES.iter()
			.chain(VERSION_02_ADDED)
			.filter(|(name, _)| !VERSION_02_REMOVED.contains(name))
			.copied()
			.collect()),
		_ => Err(crate::Error::Validation(format!("don't have any service list for version {}.", version))),
	}
}

/// All services available in the `major.minor` release, sorted by name.
///
/// # Errors
/// [`Validation`](crate::error::Error::Validation) when the release is unknown.
pub fn services_for_version(version: &str) -> crate::Result<Vec<&'static str>> {
	let mut services: Vec<&'static str> = service_table(version)?.into_iter().map(|(name, _)| name).collect();
	services.sort_unstable();
	Ok(services)
}

/// Name of the client type a service provides in the `major.minor` release, used for typings in generated bundles.
pub fn service_client_name(service: &str, version: &str) -> crate::Result<&'static str> {
	service_table(version)?
		.into_iter()
		.find(|(name, _)| *name == service)
		.map(|(_, client)| client)
		.ok_or_else(|| crate::Error::Validation(format!("service {} doesn't exist in nodecg-io {}.", service, version)))
}

pub fn service_package_name(service: &str) -> String {
	format!("nodecg-io-{}", service)
}

/// Reverse of [`service_package_name`]. `None` for core packages and foreign packages.
pub fn service_from_package_name(package: &str) -> Option<&str> {
	if CORE_PACKAGES.iter().any(|c| *c == package) {
		return None;
	}
	package.strip_prefix("nodecg-io-")
}

pub fn supported_range() -> semver::VersionReq {
	/* `<=0.2` is a fixed, valid requirement */
	semver::VersionReq::parse(SUPPORTED_RANGE).unwrap_or(semver::VersionReq::STAR)
}

/// Whether a `major.minor` release is installable by this cli.
pub fn is_supported(major_minor: &str) -> bool {
	match semver::Version::parse(&format!("{}.0", major_minor)) {
		Ok(v) => supported_range().matches(&v),
		Err(_) => false,
	}
}
