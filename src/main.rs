//! pushreg CLI - drives the registration runtime against a live directory.
//!
//! The device token comes from the command line and permission prompts are
//! answered from flags, so every flow can be exercised without a device.
//! See the `pushreg` library for the runtime itself.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use pushreg::{
    ChannelPrompter, Config, GeoFix, HistoryView, LocationSource, PermissionKind, Runtime,
    StaticTokenProvider, SubscriberProfile,
};

#[derive(Parser)]
#[command(name = "pushreg")]
#[command(version, about = "Register this device with a notification directory", long_about = None)]
struct Cli {
    /// Directory base URL (overrides config)
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Tenant id (overrides config)
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Device token issued by the push provider
    #[arg(long, global = true, env = "PUSHREG_DEVICE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Answer the notification permission prompt with "deny"
    #[arg(long, global = true)]
    deny_notifications: bool,

    /// Answer location permission prompts with "deny"
    #[arg(long, global = true)]
    deny_location: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the device (behind the permission gates)
    Register {
        #[command(flatten)]
        profile: ProfileArgs,
        /// Opt into location-based notifications
        #[arg(long)]
        location: bool,
    },
    /// Replace the profile stored in the directory
    Update {
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Delete the device record
    Unregister,
    /// Push a position for the registered device
    Locate {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Show delivered notifications
    History,
    /// Delete one history entry
    DeleteHistory {
        /// Entry id
        id: String,
    },
    /// List the tenant's interests
    Interests,
    /// Replace the tenant's interests
    SetInterests {
        /// Interest ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show the profile the directory holds for this device
    Profile,
}

#[derive(Args)]
struct ProfileArgs {
    /// Subscriber id
    #[arg(long)]
    user: String,
    /// Gender attribute
    #[arg(long)]
    gender: Option<String>,
    /// Age attribute
    #[arg(long)]
    age: Option<u32>,
    /// Interest id (repeatable)
    #[arg(long = "interest")]
    interests: Vec<String>,
    /// Latitude of the current position
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,
    /// Longitude of the current position
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,
}

impl ProfileArgs {
    fn into_profile(self) -> SubscriberProfile {
        let mut profile = SubscriberProfile::new(self.user).with_interests(self.interests);
        if let Some(gender) = self.gender {
            profile = profile.with_gender(gender);
        }
        if let Some(age) = self.age {
            profile = profile.with_age(age);
        }
        if let (Some(lat), Some(lng)) = (self.lat, self.lng) {
            profile = profile.with_position(lat, lng);
        }
        profile
    }
}

/// Location source that always reports the position given on the command line.
struct FixedLocation(GeoFix);

#[async_trait]
impl LocationSource for FixedLocation {
    async fn current_fix(&self) -> pushreg::Result<Option<GeoFix>> {
        Ok(Some(GeoFix::new(self.0.lat, self.0.lng)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(server_url) = cli.server_url.clone() {
        config.server_url = server_url;
    }
    if let Some(tenant) = cli.tenant.clone() {
        config.tenant_id = Some(tenant);
    }

    let tokens = match cli.token.clone() {
        Some(token) => StaticTokenProvider::new(token),
        None => StaticTokenProvider::empty(),
    };
    let (prompter, mut prompts) = ChannelPrompter::new(true);

    let mut builder = Runtime::builder(config)
        .token_provider(Arc::new(tokens))
        .prompter(Arc::new(prompter.clone()));
    if let Commands::Register {
        profile:
            ProfileArgs {
                lat: Some(lat),
                lng: Some(lng),
                ..
            },
        location: true,
    } = &cli.command
    {
        builder = builder.location_source(Arc::new(FixedLocation(GeoFix::new(*lat, *lng))));
    }
    let runtime = builder.build().context("Failed to start runtime")?;

    // Stand in for the OS: answer prompts from the deny flags.
    let gateway = Arc::clone(runtime.permissions());
    let (deny_notifications, deny_location) = (cli.deny_notifications, cli.deny_location);
    tokio::spawn(async move {
        while let Some(request) = prompts.recv().await {
            let granted = match request.kind {
                PermissionKind::Notification => !deny_notifications,
                PermissionKind::LocationForeground | PermissionKind::LocationBackground => {
                    !deny_location
                }
            };
            log::debug!("Answering {:?} prompt: granted={granted}", request.kind);
            prompter.reply(&gateway, request, granted);
        }
    });

    let result = run(&runtime, cli.command).await;
    if let Err(e) = runtime.shutdown().await {
        log::debug!("Shutdown: {e}");
    }
    result
}

async fn run(runtime: &Runtime, command: Commands) -> Result<()> {
    let coordinator = runtime.coordinator();

    match command {
        Commands::Register { profile, location } => {
            let profile = profile.into_profile().with_location_updates(location);
            let outcome = coordinator.register_gated(profile).await;
            println!("Notification permission: {:?}", outcome.notification);
            if let Some(location) = outcome.location {
                println!("Location permission:     {location:?}");
                println!("Location tracking:       {}", outcome.tracking_started);
            }
            outcome.registration.context("Registration failed")?;
            println!("Registered.");
        }
        Commands::Update { profile } => {
            coordinator.update(profile.into_profile()).await.context("Update failed")?;
            println!("Profile updated.");
        }
        Commands::Unregister => {
            coordinator.unregister().await.context("Unregister failed")?;
            println!("Unregistered.");
        }
        Commands::Locate { lat, lng } => {
            // Each invocation starts without a held profile; adopt the directory's.
            let profile = coordinator
                .fetch_remote_profile()
                .await
                .context("Device is not registered")?;
            coordinator.set_profile(profile).await?;
            coordinator
                .update_location(lat, lng)
                .await
                .context("Location update failed")?;
            println!("Location updated to ({lat}, {lng}).");
        }
        Commands::History => match runtime.history().fetch_current().await? {
            HistoryView::Unregistered => println!("Device is not registered."),
            HistoryView::Fresh(entries) => print_history(&entries),
            HistoryView::Cached { entries, error } => {
                eprintln!("Directory unavailable ({error}), showing cached history.");
                print_history(&entries);
            }
        },
        Commands::DeleteHistory { id } => {
            runtime.history().delete(&id).await.context("Delete failed")?;
            println!("Deleted {id}.");
        }
        Commands::Interests => {
            for option in runtime.interests().options().await? {
                println!("{:<24} {}", option.id, option.label);
            }
        }
        Commands::SetInterests { ids } => {
            runtime.interests().update(&ids).await?;
            println!("Interests updated.");
        }
        Commands::Profile => {
            let profile = coordinator.fetch_remote_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}

fn print_history(entries: &[pushreg::HistoryEntry]) {
    if entries.is_empty() {
        println!("No notifications.");
        return;
    }
    for entry in entries {
        println!(
            "{}  {}  {}: {}",
            entry.id,
            entry.sent_at.format("%Y-%m-%d %H:%M"),
            entry.title,
            entry.body
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_register_with_location() {
        let cli = Cli::try_parse_from([
            "pushreg",
            "--tenant",
            "T1",
            "register",
            "--user",
            "u1",
            "--interest",
            "sports",
            "--lat",
            "32.0",
            "--lng",
            "34.7",
            "--location",
        ])
        .unwrap();

        assert_eq!(cli.tenant.as_deref(), Some("T1"));
        let Commands::Register { profile, location } = cli.command else {
            panic!("expected register");
        };
        assert!(location);
        let profile = profile.into_profile();
        assert_eq!(profile.subscriber_id, "u1");
        assert!(profile.interests.contains("sports"));
        assert!(profile.position.is_some());
    }

    #[test]
    fn test_lat_requires_lng() {
        let parsed = Cli::try_parse_from(["pushreg", "update", "--user", "u1", "--lat", "1.0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
