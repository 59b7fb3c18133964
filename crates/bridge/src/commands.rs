//! `/teamsync link|unlink|show` channel commands.

use {
    serde::{Deserialize, Serialize},
    teamsync_common::ChannelLink,
    tracing::{info, warn},
};

use crate::{
    error::Error,
    local::{LocalChannel, LocalPlatform, LocalResult, Permission},
    remote::with_deadline,
    service::BridgeService,
};

/// Slash command trigger word.
pub const COMMAND_TRIGGER: &str = "teamsync";

const ALREADY_LINKED: &str =
    "A link for this channel already exists, please unlink the channel before you link a new one.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    Link {
        remote_team_id: String,
        remote_channel_id: String,
    },
    Unlink,
    Show,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid link command, please pass the remote team id and channel id as parameters.")]
    MissingLinkParameters,
    #[error("Unknown command. Valid options: link, unlink and show.")]
    Unknown,
}

impl BridgeCommand {
    /// Parse command text, with or without the leading `/teamsync`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut words = input.split_whitespace().peekable();
        if words
            .peek()
            .is_some_and(|w| w.trim_start_matches('/') == COMMAND_TRIGGER)
        {
            words.next();
        }
        match words.next() {
            Some("link") => match (words.next(), words.next()) {
                (Some(team), Some(channel)) => Ok(Self::Link {
                    remote_team_id: team.to_string(),
                    remote_channel_id: channel.to_string(),
                }),
                _ => Err(ParseError::MissingLinkParameters),
            },
            Some("unlink") => Ok(Self::Unlink),
            Some("show") => Ok(Self::Show),
            _ => Err(ParseError::Unknown),
        }
    }
}

/// Who issued a command, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub user_id: String,
    pub team_id: String,
    pub channel_id: String,
}

/// Ephemeral reply shown to the issuing user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
}

impl CommandResponse {
    fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

pub(crate) async fn execute(
    service: &BridgeService,
    ctx: &CommandContext,
    command: BridgeCommand,
) -> CommandResponse {
    match command {
        BridgeCommand::Link {
            remote_team_id,
            remote_channel_id,
        } => link(service, ctx, remote_team_id, remote_channel_id).await,
        BridgeCommand::Unlink => unlink(service, ctx).await,
        BridgeCommand::Show => show(service, ctx).await,
    }
}

async fn link(
    service: &BridgeService,
    ctx: &CommandContext,
    remote_team_id: String,
    remote_channel_id: String,
) -> CommandResponse {
    if !service.config().is_team_enabled(&ctx.team_id) {
        return CommandResponse::new("This team is not enabled for the bridge.");
    }
    let Ok(channel) = service.local().get_channel(&ctx.channel_id).await else {
        return CommandResponse::new("Unable to get the current channel information.");
    };
    match can_manage(service.local().as_ref(), &ctx.user_id, &channel).await {
        Ok(true) => {},
        Ok(false) => {
            return CommandResponse::new(
                "Unable to link the channel. You have to be a channel admin to link it.",
            );
        },
        Err(e) => {
            warn!(error = %e, "permission check failed");
            return CommandResponse::new("Unable to check your permissions, please try again.");
        },
    }
    if service.links().lookup(&channel.team_id, &channel.id).is_some() {
        return CommandResponse::new(ALREADY_LINKED);
    }
    let _lifecycle = service.lifecycle().await;
    let Some(cancel) = service.context() else {
        return CommandResponse::new("The bridge is not running, please try again later.");
    };

    let remote_channel = with_deadline(
        "get_channel",
        service.config().remote_timeout(),
        service
            .remote()
            .get_channel(&remote_team_id, &remote_channel_id),
    )
    .await;
    match remote_channel {
        Ok(_) => {},
        Err(e) if e.is_not_found() => {
            return CommandResponse::new("Remote channel not found.");
        },
        Err(e) => {
            warn!(error = %e, "remote channel lookup failed");
            return CommandResponse::new("Unable to reach the remote platform, please try again.");
        },
    }

    let link = ChannelLink::new(
        &channel.team_id,
        &channel.id,
        remote_team_id,
        remote_channel_id,
    );
    match service.links().add_link(link.clone()).await {
        Ok(()) => {},
        Err(Error::AlreadyLinked { .. }) => {
            return CommandResponse::new(ALREADY_LINKED);
        },
        Err(e) => {
            warn!(error = %e, "failed to store link");
            return CommandResponse::new("Unable to store the new link, please try again.");
        },
    }

    if let Err(e) = service.subscriptions().subscribe(&cancel, link.clone()).await {
        warn!(link = %link.key(), error = %e, "subscribe failed, removing link");
        if let Err(e) = service
            .links()
            .remove_link(&link.local_team_id, &link.local_channel_id)
            .await
        {
            warn!(link = %link.key(), error = %e, "failed to roll back link");
        }
        return CommandResponse::new("Unable to subscribe to the remote channel, please try again.");
    }
    if service
        .links()
        .lookup(&link.local_team_id, &link.local_channel_id)
        .as_ref()
        != Some(&link)
    {
        warn!(link = %link.key(), "link removed while subscribing, dropping subscription");
        if let Err(e) = service.subscriptions().unsubscribe(&link).await {
            warn!(link = %link.key(), error = %e, "failed to drop subscription of removed link");
        }
        return CommandResponse::new("The channel was unlinked while linking, please try again.");
    }

    info!(link = %link.key(), user_id = %ctx.user_id, "channel linked by command");
    CommandResponse::new("The remote channel is now linked to this channel.")
}

async fn unlink(service: &BridgeService, ctx: &CommandContext) -> CommandResponse {
    let Ok(channel) = service.local().get_channel(&ctx.channel_id).await else {
        return CommandResponse::new("Unable to get the current channel information.");
    };
    match can_manage(service.local().as_ref(), &ctx.user_id, &channel).await {
        Ok(true) => {},
        Ok(false) => {
            return CommandResponse::new(
                "Unable to unlink the channel, you have to be a channel admin to unlink it.",
            );
        },
        Err(e) => {
            warn!(error = %e, "permission check failed");
            return CommandResponse::new("Unable to check your permissions, please try again.");
        },
    }
    let _lifecycle = service.lifecycle().await;
    let Some(link) = service.links().lookup(&channel.team_id, &channel.id) else {
        return CommandResponse::new("This channel is not linked.");
    };

    if let Err(e) = service.subscriptions().unsubscribe(&link).await {
        warn!(link = %link.key(), error = %e, "unsubscribe failed, keeping link");
        return CommandResponse::new("Unable to unsubscribe from the remote channel, please try again.");
    }
    if let Err(e) = service
        .links()
        .remove_link(&link.local_team_id, &link.local_channel_id)
        .await
    {
        warn!(link = %link.key(), error = %e, "failed to remove link");
        return CommandResponse::new("Unable to remove the link, please try again.");
    }

    info!(link = %link.key(), user_id = %ctx.user_id, "channel unlinked by command");
    CommandResponse::new("The remote channel is no longer linked to this channel.")
}

async fn show(service: &BridgeService, ctx: &CommandContext) -> CommandResponse {
    let Ok(channel) = service.local().get_channel(&ctx.channel_id).await else {
        return CommandResponse::new("Unable to get the current channel information.");
    };
    let Some(link) = service.links().lookup(&channel.team_id, &channel.id) else {
        return CommandResponse::new("This channel is not linked.");
    };

    let deadline = service.config().remote_timeout();
    let Ok(team) = with_deadline(
        "get_team",
        deadline,
        service.remote().get_team(&link.remote_team_id),
    )
    .await
    else {
        return CommandResponse::new("Unable to get the remote team information.");
    };
    let Ok(remote_channel) = with_deadline(
        "get_channel",
        deadline,
        service
            .remote()
            .get_channel(&link.remote_team_id, &link.remote_channel_id),
    )
    .await
    else {
        return CommandResponse::new("Unable to get the remote channel information.");
    };

    CommandResponse::new(format!(
        "This channel is linked to the remote channel \"{}\" in the team \"{}\".",
        remote_channel.display_name, team.display_name
    ))
}

async fn can_manage(
    local: &dyn LocalPlatform,
    user_id: &str,
    channel: &LocalChannel,
) -> LocalResult<bool> {
    let Some(permission) = Permission::for_channel(channel.kind) else {
        return Ok(false);
    };
    local.has_permission(user_id, &channel.id, permission).await
}
