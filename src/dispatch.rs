//! Dispatch scheduler: materializes one message per (chat, segment) pair
//! from already-persisted data and edits it in place on every tick.
//!
//! Never triggers a live fetch. Duplicate ticks for a pair are skipped via
//! an in-flight set; failures back off exponentially per pair; stale data
//! or an open circuit marks the output as degraded instead of silently
//! serving old numbers as fresh.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::logger::{self, LogTag};
use crate::notify::{NotifyError, NotifySink};
use crate::services::Services;
use crate::types::TokenIntel;

/// The four push segments, each with its own selection rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Fresh,
    Hatching,
    Cooking,
    Top,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Fresh => "fresh",
            Segment::Hatching => "hatching",
            Segment::Cooking => "cooking",
            Segment::Top => "top",
        }
    }

    fn tag_column(&self) -> Option<&'static str> {
        match self {
            Segment::Fresh => Some("is_fresh"),
            Segment::Hatching => Some("is_hatching"),
            Segment::Cooking => Some("is_cooking"),
            Segment::Top => None,
        }
    }

    fn header(&self) -> &'static str {
        match self {
            Segment::Fresh => "🌊 Fresh Signals",
            Segment::Hatching => "🐣 Hatching Now",
            Segment::Cooking => "🍳 Cooking",
            Segment::Top => "🏆 Top Scored",
        }
    }

    fn empty_line(&self) -> &'static str {
        match self {
            Segment::Fresh => "Reservoir's dry. No fresh signals right now.",
            Segment::Hatching => "The nest is empty. No brand-new sound tokens right now.",
            Segment::Cooking => "Stove's cold. Nothing showing momentum right now.",
            Segment::Top => "The pot's thin right now, check back later.",
        }
    }
}

/// A built message, ready for delivery.
struct SegmentMessage {
    text: String,
    served: Vec<String>,
    degraded: bool,
}

pub struct Dispatcher {
    services: Services,
    sink: Arc<dyn NotifySink>,
    in_flight: Mutex<HashSet<(i64, &'static str)>>,
    failures: Mutex<HashMap<(i64, &'static str), (Instant, u32)>>,
}

impl Dispatcher {
    pub fn new(services: Services, sink: Arc<dyn NotifySink>) -> Arc<Self> {
        Arc::new(Self {
            services,
            sink,
            in_flight: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashMap::new()),
        })
    }

    /// Spawn one push loop per (chat, segment) pair for the configured chats.
    pub fn spawn_loops(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let config = &self.services.config.dispatch;
        let secrets = &self.services.secrets;

        let mut targets: Vec<(i64, Segment, u64)> = Vec::new();
        if secrets.public_chat_id != 0 {
            let chat = secrets.public_chat_id;
            targets.push((chat, Segment::Fresh, config.fresh_interval_secs));
            targets.push((chat, Segment::Cooking, config.cooking_interval_secs));
            targets.push((chat, Segment::Hatching, config.hatching_interval_secs));
            targets.push((chat, Segment::Top, config.top_interval_secs));
        }
        if secrets.vip_chat_id != 0 {
            let chat = secrets.vip_chat_id;
            targets.push((chat, Segment::Fresh, config.fresh_interval_secs));
            targets.push((chat, Segment::Cooking, config.cooking_interval_secs));
            targets.push((chat, Segment::Hatching, config.vip_hatching_interval_secs));
            targets.push((chat, Segment::Top, config.vip_top_interval_secs));
        }

        if targets.is_empty() {
            logger::warning(
                LogTag::Dispatch,
                "No chat targets configured - dispatch disabled",
            );
            return handles;
        }

        for (chat_id, segment, interval_secs) in targets {
            let dispatcher = self.clone();
            handles.push(tokio::spawn(async move {
                let mut shutdown = dispatcher.services.shutdown.clone();
                let interval = Duration::from_secs(interval_secs.max(5));
                loop {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(interval) => {
                            dispatcher.push(chat_id, segment).await;
                        }
                    }
                }
            }));
        }
        logger::log(
            LogTag::Dispatch,
            "START",
            &format!("{} push loops running", handles.len()),
        );
        handles
    }

    /// One dispatch tick for a (chat, segment) pair.
    pub async fn push(&self, chat_id: i64, segment: Segment) {
        let key = (chat_id, segment.as_str());

        // Duplicate prevention: skip the tick when the previous one for this
        // pair has not finished
        {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if !in_flight.insert(key) {
                logger::debug(
                    LogTag::Dispatch,
                    &format!("{}/{} still in flight, skipping tick", chat_id, segment.as_str()),
                );
                return;
            }
        }

        if self.in_backoff(key) {
            self.clear_in_flight(key);
            return;
        }

        let outcome = self.push_inner(chat_id, segment).await;
        match outcome {
            Ok(()) => self.record_success(key),
            Err(e) => {
                logger::error(
                    LogTag::Dispatch,
                    &format!("Push {}/{} failed: {}", chat_id, segment.as_str(), e),
                );
                self.record_failure(key);
            }
        }
        self.clear_in_flight(key);
    }

    fn clear_in_flight(&self, key: (i64, &'static str)) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&key);
        }
    }

    fn in_backoff(&self, key: (i64, &'static str)) -> bool {
        let config = &self.services.config.dispatch;
        if let Ok(failures) = self.failures.lock() {
            if let Some((last_failure, count)) = failures.get(&key) {
                let backoff_secs = (config.backoff_base_secs as f64
                    * 2f64.powi((*count as i32 - 1).clamp(0, 16)))
                .min(config.backoff_cap_secs as f64);
                if last_failure.elapsed() < Duration::from_secs_f64(backoff_secs) {
                    logger::debug(
                        LogTag::Dispatch,
                        &format!(
                            "{}/{} backing off for {:.0}s after {} failures",
                            key.0, key.1, backoff_secs, count
                        ),
                    );
                    return true;
                }
            }
        }
        false
    }

    fn record_failure(&self, key: (i64, &'static str)) {
        if let Ok(mut failures) = self.failures.lock() {
            let entry = failures.entry(key).or_insert((Instant::now(), 0));
            *entry = (Instant::now(), entry.1 + 1);
        }
    }

    fn record_success(&self, key: (i64, &'static str)) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(&key);
        }
    }

    async fn push_inner(&self, chat_id: i64, segment: Segment) -> Result<(), String> {
        let message = self
            .build_segment_message(segment)
            .map_err(|e| format!("build failed: {}", e))?;

        // Respect the platform's send ceilings before any delivery attempt
        self.services.limits.acquire("telegram_global").await;
        if chat_id < 0 {
            self.services
                .limits
                .group_bucket(chat_id)
                .await
                .acquire(1.0)
                .await;
        }
        self.services
            .limits
            .chat_bucket(chat_id)
            .await
            .acquire(1.0)
            .await;

        let stored_id = self
            .services
            .db
            .dispatch_message_id(chat_id, segment.as_str())
            .map_err(|e| e.to_string())?;

        let mut need_send = true;
        if let Some(message_id) = stored_id {
            match self
                .sink
                .edit_message(chat_id, message_id, &message.text)
                .await
            {
                Ok(()) => need_send = false,
                Err(NotifyError::NotModified) => {
                    // Same content as last tick: done
                    need_send = false;
                }
                Err(NotifyError::MessageMissing) => {
                    logger::debug(
                        LogTag::Dispatch,
                        &format!(
                            "{}/{} stored message gone, sending fresh",
                            chat_id,
                            segment.as_str()
                        ),
                    );
                }
                Err(NotifyError::Other(e)) => return Err(e),
            }
        }

        if need_send {
            let message_id = match self.sink.send_message(chat_id, &message.text).await {
                Ok(id) => id,
                Err(e) => return Err(e.to_string()),
            };
            self.services
                .db
                .set_dispatch_message_id(chat_id, segment.as_str(), message_id)
                .map_err(|e| e.to_string())?;
        }

        if !message.served.is_empty() {
            self.services
                .db
                .mark_served(&message.served)
                .map_err(|e| e.to_string())?;
        }

        logger::debug(
            LogTag::Dispatch,
            &format!(
                "{}/{} delivered ({} items{})",
                chat_id,
                segment.as_str(),
                message.served.len(),
                if message.degraded { ", lite mode" } else { "" }
            ),
        );
        Ok(())
    }

    /// Build the outgoing message purely from persisted data, with
    /// progressively looser fallback queries when the tag query is empty.
    fn build_segment_message(&self, segment: Segment) -> anyhow::Result<SegmentMessage> {
        let config = &self.services.config.dispatch;
        let db = &self.services.db;
        let cooldown = db.recently_served(Duration::from_secs(
            (config.push_cooldown_hours.max(0) as u64) * 3600,
        ))?;
        let limit = config.items_per_segment;

        let min_score = match segment {
            Segment::Fresh => config.min_score_fresh,
            Segment::Hatching => config.min_score_hatching,
            _ => config.min_score_default,
        };

        let mut items = match segment.tag_column() {
            Some(column) => db.select_by_tag(column, min_score, &cooldown, limit)?,
            None => db.select_top(min_score, &cooldown, limit)?,
        };
        if items.is_empty() {
            items = db.select_by_volume(config.cooking_fallback_volume_min, &cooldown, limit)?;
        }
        if items.is_empty() {
            items = db.select_by_recency(&cooldown, limit)?;
        }

        // Zero-liquidity rows never belong in a list
        items.retain(|intel| intel.liquidity_usd.map(|l| l > 0.0).unwrap_or(true));

        if items.is_empty() {
            return Ok(SegmentMessage {
                text: format!("<b>{}</b>\n\n{}", segment.header(), segment.empty_line()),
                served: Vec::new(),
                degraded: false,
            });
        }

        // Degraded when a circuit cooldown is active or any selected asset's
        // freshest snapshot is stale/missing
        let staleness = self.services.config.reanalysis.snapshot_staleness_secs;
        let mut degraded = self.services.health.lite_mode();
        if !degraded {
            for intel in &items {
                match db.latest_snapshot(&intel.mint)? {
                    Some(stored) if stored.age_secs <= staleness => {}
                    _ => {
                        degraded = true;
                        break;
                    }
                }
            }
        }

        let mut header = format!("<b>{}</b>", segment.header());
        if degraded {
            header.push_str(" — ⚡ Lite Mode");
        }
        let lines: Vec<String> = items.iter().map(format_item).collect();
        let served = items.iter().map(|intel| intel.mint.clone()).collect();

        Ok(SegmentMessage {
            text: format!("{}\n\n{}", header, lines.join("\n\n")),
            served,
            degraded,
        })
    }
}

fn format_usd(value: Option<f64>) -> String {
    match value {
        Some(v) if v >= 1_000_000.0 => format!("${:.1}M", v / 1_000_000.0),
        Some(v) if v >= 1_000.0 => format!("${:.1}k", v / 1_000.0),
        Some(v) => format!("${:.0}", v),
        None => "n/a".to_string(),
    }
}

fn format_age(age_minutes: Option<f64>) -> String {
    match age_minutes {
        Some(mins) if mins >= 1_440.0 => format!("{:.1}d", mins / 1_440.0),
        Some(mins) if mins >= 60.0 => format!("{:.1}h", mins / 60.0),
        Some(mins) => format!("{:.0}m", mins),
        None => "?".to_string(),
    }
}

fn format_item(intel: &TokenIntel) -> String {
    format!(
        "<b>{}</b> — score {}\n<code>{}</code>\nLiq {} | Vol {} | Age {}",
        intel.symbol.as_deref().unwrap_or("Unnamed"),
        intel.score,
        intel.mint,
        format_usd(intel.liquidity_usd),
        format_usd(intel.volume_24h_usd),
        format_age(intel.age_minutes),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetTags, Bucket};
    use async_trait::async_trait;

    /// In-memory sink mirroring Telegram's edit semantics.
    struct MockSink {
        messages: Mutex<HashMap<(i64, i64), String>>,
        sends: Mutex<u64>,
        edits: Mutex<u64>,
        next_id: Mutex<i64>,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(HashMap::new()),
                sends: Mutex::new(0),
                edits: Mutex::new(0),
                next_id: Mutex::new(0),
            })
        }

        fn send_count(&self) -> u64 {
            *self.sends.lock().unwrap()
        }

        fn edit_count(&self) -> u64 {
            *self.edits.lock().unwrap()
        }
    }

    #[async_trait]
    impl NotifySink for MockSink {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, NotifyError> {
            *self.sends.lock().unwrap() += 1;
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            self.messages
                .lock()
                .unwrap()
                .insert((chat_id, *next), text.to_string());
            Ok(*next)
        }

        async fn edit_message(
            &self,
            chat_id: i64,
            message_id: i64,
            text: &str,
        ) -> Result<(), NotifyError> {
            *self.edits.lock().unwrap() += 1;
            let mut messages = self.messages.lock().unwrap();
            match messages.get(&(chat_id, message_id)) {
                None => Err(NotifyError::MessageMissing),
                Some(existing) if existing == text => Err(NotifyError::NotModified),
                Some(_) => {
                    messages.insert((chat_id, message_id), text.to_string());
                    Ok(())
                }
            }
        }
    }

    fn seed_hatching_asset(services: &Services, mint: &str) {
        services.db.insert_discovered(mint).unwrap();
        let intel = TokenIntel {
            mint: mint.to_string(),
            symbol: Some("TEST".to_string()),
            liquidity_usd: Some(500.0),
            volume_24h_usd: Some(100.0),
            age_minutes: Some(10.0),
            score: 40,
            ..Default::default()
        };
        let tags = AssetTags {
            hatching: true,
            fresh: true,
            cooking: false,
        };
        services
            .db
            .persist_analysis(mint, &intel, tags, Bucket::Hatching, 30.0, false)
            .unwrap();
        services.db.save_snapshot(mint, &intel).unwrap();
    }

    #[tokio::test]
    async fn test_idempotent_dispatch_edits_never_resends() {
        let services = Services::for_tests();
        seed_hatching_asset(&services, "mint-a");

        let sink = MockSink::new();
        let dispatcher = Dispatcher::new(services.clone(), sink.clone());

        // First tick sends and stores the message id
        dispatcher.push(-100, Segment::Hatching).await;
        assert_eq!(sink.send_count(), 1);
        let stored = services
            .db
            .dispatch_message_id(-100, "hatching")
            .unwrap()
            .expect("message id stored");

        // Second tick with no data change: one "not modified" edit, no send
        dispatcher.push(-100, Segment::Hatching).await;
        assert_eq!(sink.send_count(), 1);
        assert_eq!(sink.edit_count(), 1);
        assert_eq!(
            services.db.dispatch_message_id(-100, "hatching").unwrap(),
            Some(stored)
        );
    }

    #[tokio::test]
    async fn test_missing_message_falls_through_to_send() {
        let services = Services::for_tests();
        seed_hatching_asset(&services, "mint-a");

        let sink = MockSink::new();
        let dispatcher = Dispatcher::new(services.clone(), sink.clone());

        // A stale record pointing at a message the sink never saw
        services
            .db
            .set_dispatch_message_id(-100, "hatching", 999)
            .unwrap();

        dispatcher.push(-100, Segment::Hatching).await;
        assert_eq!(sink.edit_count(), 1);
        assert_eq!(sink.send_count(), 1);
        let stored = services.db.dispatch_message_id(-100, "hatching").unwrap();
        assert_ne!(stored, Some(999));
    }

    #[tokio::test]
    async fn test_served_marking_and_cooldown() {
        let services = Services::for_tests();
        seed_hatching_asset(&services, "mint-a");

        let sink = MockSink::new();
        let dispatcher = Dispatcher::new(services.clone(), sink.clone());
        dispatcher.push(-100, Segment::Hatching).await;

        let counts = services.db.status_counts().unwrap();
        assert!(counts.contains(&("served".to_string(), 1)));
        let served = services
            .db
            .recently_served(Duration::from_secs(3600))
            .unwrap();
        assert!(served.contains("mint-a"));
    }

    #[tokio::test]
    async fn test_empty_segment_sends_placeholder() {
        let services = Services::for_tests();
        let sink = MockSink::new();
        let dispatcher = Dispatcher::new(services.clone(), sink.clone());

        dispatcher.push(-100, Segment::Cooking).await;
        assert_eq!(sink.send_count(), 1);
        let messages = sink.messages.lock().unwrap();
        let text = messages.values().next().unwrap();
        assert!(text.contains("Stove's cold"));
    }

    #[test]
    fn test_backoff_window_grows_and_clears() {
        let services = Services::for_tests();
        let sink = MockSink::new();
        let dispatcher = Dispatcher::new(services, sink);
        let key = (-100i64, "fresh");

        assert!(!dispatcher.in_backoff(key));
        dispatcher.record_failure(key);
        assert!(dispatcher.in_backoff(key));
        dispatcher.record_success(key);
        assert!(!dispatcher.in_backoff(key));
    }
}
