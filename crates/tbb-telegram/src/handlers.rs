//! Teloxide endpoint translating Telegram messages into core updates.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use tbb_core::{
    domain::{ChatId, UserId},
    messaging::types::InboundMessage,
    router::UpdateRouter,
};

pub async fn handle_message(msg: Message, router: Arc<UpdateRouter>) -> ResponseResult<()> {
    let Some(inbound) = to_inbound(&msg) else {
        return Ok(());
    };
    let routed = router.handle(inbound).await;
    debug!(chat_id = msg.chat.id.0, ?routed, "message handled");
    Ok(())
}

/// Messages without a human sender (channel posts, service messages) are
/// skipped.
fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from.as_ref()?;
    if user.is_bot {
        return None;
    }
    let user_id = i64::try_from(user.id.0).ok()?;

    Some(InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user_id),
        username: user.username.clone(),
        text: msg.text().map(str::to_string),
    })
}
