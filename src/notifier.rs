// src/notifier.rs
//
// Notification fan-out: one pass per committed change event. Walks the
// vehicle's watchers (minus whoever triggered the change), applies each
// watcher's preference filters, persists a notification row per survivor and
// attempts delivery. At-least-once: a failed delivery is logged, the persisted
// row stays, and the pass continues with the next watcher.

use crate::db::{self, Database};
use crate::domain::changes::{PriceChangeRecord, StatusChangeRecord};
use crate::domain::vehicle::Vehicle;
use crate::domain::watchlist::{
    evaluate_price_event, evaluate_status_event, NotificationType, WatchlistEntry,
};
use crate::errors::ServerError;
use crate::mailer::{notification_html, BrevoMailer};
use chrono::Utc;

#[derive(Clone)]
pub struct Notifier {
    mailer: Option<BrevoMailer>,
}

impl Notifier {
    pub fn new(mailer: Option<BrevoMailer>) -> Self {
        Self { mailer }
    }

    /// Returns how many watchers were notified.
    pub fn fan_out_price_change(
        &self,
        db: &Database,
        vehicle: &Vehicle,
        change: &PriceChangeRecord,
    ) -> Result<usize, ServerError> {
        let watchers = db.with_conn(|conn| {
            db::watchlist::watchers_for_vehicle(conn, vehicle.id, change.triggered_by_user_id)
        })?;

        let delta = change.delta();
        eprintln!(
            "📣 Price change on vehicle {}: {} → {} ({:+.1}%), {} watcher(s) to consider",
            vehicle.id,
            format_usd(delta.previous),
            format_usd(delta.new),
            delta.percent,
            watchers.len()
        );

        let mut notified = 0;
        for watcher in &watchers {
            let Some(kind) = evaluate_price_event(watcher, &delta) else {
                continue;
            };
            let (title, body) = render_price_content(kind, vehicle, change);
            self.deliver(db, vehicle, watcher, kind, &title, &body, Some(change.id), None)?;
            notified += 1;
        }
        Ok(notified)
    }

    pub fn fan_out_status_change(
        &self,
        db: &Database,
        vehicle: &Vehicle,
        change: &StatusChangeRecord,
    ) -> Result<usize, ServerError> {
        let watchers = db.with_conn(|conn| {
            db::watchlist::watchers_for_vehicle(conn, vehicle.id, change.triggered_by_user_id)
        })?;

        eprintln!(
            "📣 Status change on vehicle {}: {} → {}, {} watcher(s) to consider",
            vehicle.id,
            change.previous_status.as_str(),
            change.new_status.as_str(),
            watchers.len()
        );

        let mut notified = 0;
        for watcher in &watchers {
            let Some(kind) = evaluate_status_event(watcher, change.new_status) else {
                continue;
            };
            let (title, body) = render_status_content(kind, vehicle, change);
            self.deliver(db, vehicle, watcher, kind, &title, &body, None, Some(change.id))?;
            notified += 1;
        }
        Ok(notified)
    }

    /// Persist the notification, attempt delivery on the user's channel, stamp
    /// sent_at only on success, and bump the watcher's last_notified_at.
    fn deliver(
        &self,
        db: &Database,
        vehicle: &Vehicle,
        watcher: &WatchlistEntry,
        kind: NotificationType,
        title: &str,
        body: &str,
        price_change_id: Option<i64>,
        status_change_id: Option<i64>,
    ) -> Result<(), ServerError> {
        let user = db.with_conn(|conn| db::users::get_user(conn, watcher.user_id))?;
        let Some(user) = user else {
            eprintln!("⚠️ Watcher user {} not found, skipping", watcher.user_id);
            return Ok(());
        };

        let mailer = self
            .mailer
            .as_ref()
            .filter(|_| user.email_notifications);
        let channel = if mailer.is_some() { "EMAIL" } else { "IN_APP" };
        let now = Utc::now().naive_utc();

        let notification_id = db.with_conn(|conn| {
            db::notifications::insert_notification(
                conn,
                user.id,
                vehicle.id,
                kind.as_str(),
                title,
                body,
                price_change_id,
                status_change_id,
                channel,
                now,
            )
        })?;

        if let Some(mailer) = mailer {
            let html = notification_html(
                title,
                body,
                &vehicle.display_name(),
                vehicle.source_urls.first().map(String::as_str),
                vehicle.primary_photo_url.as_deref(),
            );
            match mailer.send_notification(&user.email, title, &html) {
                Ok(()) => {
                    db.with_conn(|conn| {
                        db::notifications::mark_sent(conn, notification_id, Utc::now().naive_utc())
                    })?;
                }
                Err(e) => {
                    // Best-effort: the notification row stays unsent.
                    eprintln!("⚠️ Email to {} failed: {e}", user.email);
                }
            }
        }

        db.with_conn(|conn| db::watchlist::touch_last_notified(conn, watcher.id, now))?;
        Ok(())
    }
}

fn render_price_content(
    kind: NotificationType,
    vehicle: &Vehicle,
    change: &PriceChangeRecord,
) -> (String, String) {
    let name = vehicle.display_name();
    let previous = format_usd(change.previous_price);
    let new = format_usd(change.new_price);
    match kind {
        NotificationType::TargetPriceHit => (
            format!("🎯 Target Price Hit: {name}"),
            format!("The vehicle is now at your target price of {new}!"),
        ),
        NotificationType::PriceRise => (
            format!("📈 Price Increase: {name}"),
            format!(
                "Price increased from {previous} to {new} (+{:.1}%)",
                change.change_percent
            ),
        ),
        _ => (
            format!("🔻 Price Drop: {name}"),
            format!(
                "Price dropped from {previous} to {new} ({:.1}% off)",
                change.change_percent.abs()
            ),
        ),
    }
}

fn render_status_content(
    kind: NotificationType,
    vehicle: &Vehicle,
    change: &StatusChangeRecord,
) -> (String, String) {
    let name = vehicle.display_name();
    match kind {
        NotificationType::RelistDetected => (
            format!("🔄 Relisted: {name}"),
            "This vehicle has been relisted. It may be back on the market!".to_string(),
        ),
        _ => (
            format!("📋 Status Update: {name}"),
            format!(
                "Status changed from {} to {}",
                change.previous_status.as_str(),
                change.new_status.as_str()
            ),
        ),
    }
}

/// Whole-dollar rendering of a minor-unit amount, thousands separated.
pub fn format_usd(cents: i64) -> String {
    let dollars = cents / 100;
    let sign = if dollars < 0 { "-" } else { "" };
    let digits = dollars.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_formatting_groups_thousands() {
        assert_eq!(format_usd(2_150_000), "$21,500");
        assert_eq!(format_usd(99_900), "$999");
        assert_eq!(format_usd(123_456_700), "$1,234,567");
        assert_eq!(format_usd(-200_000), "-$2,000");
    }
}
