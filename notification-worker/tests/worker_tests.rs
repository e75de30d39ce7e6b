//! Notification Worker dispatch tests
//!
//! Routing-level behavior is covered end-to-end in the workspace `tests/`
//! crate over the in-memory broker; these exercise the note builders and
//! the WhatsApp template registry from outside the crate.

use notification_worker::database::NotificationOwner;
use notification_worker::whatsapp::provider_template;
use notification_worker::worker::build_note;
use ridecore_types::{PushIds, PushPayload};

#[tokio::test]
async fn test_driver_payment_note() {
    let payload = PushPayload {
        title: None,
        message: None,
        image_url: None,
        driver_name: Some("Kumar".to_string()),
        ids: PushIds::default(),
    };

    let note = build_note(NotificationOwner::Driver, "payment", &payload);
    assert_eq!(note.title, "Payment Received");
    assert_eq!(note.channel_key, "payment_channel");
    assert!(note.message.contains("Kumar"));
}

#[tokio::test]
async fn test_vendor_commission_note() {
    let note = build_note(
        NotificationOwner::Vendor,
        "commission",
        &PushPayload::default(),
    );
    assert_eq!(note.title, "Commission Update");
    assert_eq!(note.channel_key, "commission_channel");
}

#[test]
fn test_logical_templates_resolve() {
    for name in [
        "otp",
        "trip_otp",
        "trip_cancelled",
        "trip_completed",
        "booking_confirmed",
    ] {
        assert!(provider_template(name).is_some(), "missing template {name}");
    }
    assert!(provider_template("nonexistent").is_none());
}
