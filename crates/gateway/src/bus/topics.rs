// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed subject/topic builders for the bus taxonomy (`spec.md` §4.E).

pub fn match_request() -> String {
    "match.request".to_owned()
}

pub fn match_cancel() -> String {
    "match.cancel".to_owned()
}

pub fn match_found(session_id: &str) -> String {
    format!("match.found.{session_id}")
}

pub fn match_notify(session_id: &str) -> String {
    format!("match.notify.{session_id}")
}

pub fn chat(chat_id: &str) -> String {
    format!("chat.{chat_id}")
}

pub fn moderation_check() -> String {
    "moderation.check".to_owned()
}

pub fn moderation_result(session_id: &str) -> String {
    format!("moderation.result.{session_id}")
}
