pub mod keyboard;

use std::sync::Arc;

use serenity::all::{ComponentInteraction, CreateInteractionResponse, CreateMessage, UserId};
use serenity::model::channel::Message;
use serenity::prelude::Context;
use tracing::{debug, warn};

use crate::models::{Directive, InboundEvent, MAX_TEXT_CHARS};
use crate::services::dialogue_service::DialogueController;

async fn controller(ctx: &Context) -> Option<Arc<DialogueController>> {
    let data = ctx.data.read().await;
    data.get::<crate::Dialogue>().cloned()
}

/// Direct messages are the only conversation channel
pub async fn handle_message(ctx: &Context, msg: &Message) {
    if msg.author.bot || msg.guild_id.is_some() {
        return;
    }

    let event = InboundEvent {
        address: msg.author.id.get() as i64,
        text: msg.content.clone(),
        display_name: msg.author.global_name.clone().or_else(|| Some(msg.author.name.clone())),
    };

    if let Some(directives) = handle_event(ctx, &event).await {
        deliver(ctx, directives).await;
    }
}

/// A pressed button counts as the participant typing its label.
///
/// The press reaches the controller before any HTTP call, so presses from
/// one user are handled in the order they arrived.
pub async fn handle_component(ctx: &Context, component: &ComponentInteraction) {
    let event = InboundEvent {
        address: component.user.id.get() as i64,
        text: component.data.custom_id.clone(),
        display_name: component.user.global_name.clone(),
    };

    let directives = handle_event(ctx, &event).await;

    if let Err(e) = component
        .create_response(ctx, CreateInteractionResponse::Acknowledge)
        .await
    {
        warn!("Failed to acknowledge button press: {}", e);
    }

    if let Some(directives) = directives {
        deliver(ctx, directives).await;
    }
}

async fn handle_event(ctx: &Context, event: &InboundEvent) -> Option<Vec<Directive>> {
    let Some(controller) = controller(ctx).await else {
        warn!("Dialogue controller not initialized, dropping message from {}", event.address);
        return None;
    };

    Some(controller.handle(event).await)
}

async fn deliver(ctx: &Context, directives: Vec<Directive>) {
    for directive in directives {
        if let Err(e) = send_directive(ctx, &directive).await {
            warn!("❌ Failed to deliver message to {}: {}", directive.address, e);
        }
    }
}

async fn send_directive(ctx: &Context, directive: &Directive) -> Result<(), String> {
    let user_id = u64::try_from(directive.address)
        .ok()
        .filter(|id| *id != 0)
        .map(UserId::new)
        .ok_or_else(|| format!("Invalid address {}", directive.address))?;

    let channel = user_id
        .create_dm_channel(ctx)
        .await
        .map_err(|e| e.to_string())?;

    let content: String = directive.text.chars().take(MAX_TEXT_CHARS).collect();
    let message = CreateMessage::default()
        .content(content)
        .components(keyboard::action_rows(&directive.keyboard));

    channel
        .id
        .send_message(ctx, message)
        .await
        .map_err(|e| e.to_string())?;

    debug!("Delivered message to {}", directive.address);
    Ok(())
}
