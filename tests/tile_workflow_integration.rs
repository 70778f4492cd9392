//! Integration tests for the tile workflow
//!
//! These tests drive the full stack (in-process worker, supervisor, tile
//! worker) the way the control surface would:
//! - Tiles waiting for a late producer
//! - Recovery and re-entry of the error state
//! - Settings updates and the sensor catalog

mod common;

use common::builders::{cpu_uid, desktop_region, gpu_uid, TileSettingsBuilder};
use common::mock_helpers::{Delivery, InProcessLauncher, LabelRenderer, RecordingTransport};
use hwinfo_deck::config::ServiceConfig;
use hwinfo_deck::hwinfo::InMemoryRegion;
use hwinfo_deck::service::{TelemetryServiceClient, TelemetrySource};
use hwinfo_deck::tiles::worker::SHOW_UI_MESSAGE;
use hwinfo_deck::tiles::{DeckHandle, TileEvent, TileWorker, TileWorkerOptions};
use std::sync::Arc;
use std::time::Duration;

const PLACEHOLDER: &str = "launch hwinfo";

struct Deck {
    region: InMemoryRegion,
    transport: RecordingTransport,
    handle: DeckHandle,
}

fn start_deck(initial_region: Vec<u8>) -> Deck {
    let region = InMemoryRegion::new(initial_region);
    let service = ServiceConfig {
        liveness_interval_ms: 20,
        ..Default::default()
    };
    let client = TelemetryServiceClient::start(Box::new(InProcessLauncher::new(region.clone())), &service).unwrap();
    let source: Arc<dyn TelemetrySource> = Arc::new(client);

    let transport = RecordingTransport::default();
    let handle = TileWorker::spawn(
        TileWorkerOptions {
            refresh_interval: Duration::from_millis(15),
            history_capacity: 72,
            unavailable_message: "HWiNFO Unavailable".into(),
            placeholder: Some(PLACEHOLDER.as_bytes().to_vec()),
        },
        source,
        Box::new(LabelRenderer),
        Box::new(transport.clone()),
    )
    .unwrap();

    Deck {
        region,
        transport,
        handle,
    }
}

fn status_events(deliveries: &[Delivery], context: &str) -> Vec<(bool, String)> {
    deliveries
        .iter()
        .filter_map(|d| match d {
            Delivery::Event(c, TileEvent::Status { error, message }) if c == context => {
                Some((*error, message.clone()))
            }
            _ => None,
        })
        .collect()
}

fn has_image(deliveries: &[Delivery], context: &str, text: &str) -> bool {
    deliveries
        .iter()
        .any(|d| matches!(d, Delivery::Image(c, t) if c == context && t == text))
}

#[test]
fn test_tile_waits_for_late_producer_then_recovers() {
    let deck = start_deck(Vec::new());
    deck.handle
        .show("cpu-temp", TileSettingsBuilder::new(&cpu_uid(), 1).build());

    assert!(common::wait_until(|| has_image(&deck.transport.snapshot(), "cpu-temp", PLACEHOLDER)));

    deck.region.replace(desktop_region(54.4).build());
    assert!(common::wait_until(|| has_image(&deck.transport.snapshot(), "cpu-temp", "54 °C")));

    let deliveries = deck.transport.snapshot();
    assert_eq!(
        status_events(&deliveries, "cpu-temp"),
        vec![
            (true, "HWiNFO Unavailable".to_string()),
            (false, SHOW_UI_MESSAGE.to_string()),
        ]
    );
    let persisted: Vec<bool> = deliveries
        .iter()
        .filter_map(|d| match d {
            Delivery::Settings(_, s) => Some(s.in_error_state),
            _ => None,
        })
        .collect();
    assert_eq!(persisted, vec![true, false]);
}

#[test]
fn test_error_state_reentered_once_when_producer_disappears() {
    let deck = start_deck(desktop_region(50.0).build());
    deck.handle
        .show("usage", TileSettingsBuilder::new(&cpu_uid(), 2).build());
    assert!(common::wait_until(|| has_image(&deck.transport.snapshot(), "usage", "38%")));

    deck.region.replace(Vec::new());
    assert!(common::wait_until(|| {
        deck.transport
            .snapshot()
            .iter()
            .filter(|d| matches!(d, Delivery::Image(c, t) if c == "usage" && t == PLACEHOLDER))
            .count()
            >= 3
    }));

    assert_eq!(
        status_events(&deck.transport.snapshot(), "usage"),
        vec![(true, "HWiNFO Unavailable".to_string())]
    );
}

#[test]
fn test_divisor_format_and_settings_update() {
    let deck = start_deck(desktop_region(50.0).build());
    deck.handle.show(
        "gpu",
        TileSettingsBuilder::new(&gpu_uid(), 1)
            .divisor("1000")
            .format("%.2f")
            .build(),
    );
    assert!(common::wait_until(|| has_image(&deck.transport.snapshot(), "gpu", "1.95 MHz")));

    deck.handle.update_settings(
        "gpu",
        TileSettingsBuilder::new(&gpu_uid(), 2).format("%,.0f MB").build(),
    );
    assert!(common::wait_until(|| has_image(&deck.transport.snapshot(), "gpu", "1,234,567 MB")));
}

#[test]
fn test_bad_divisor_only_affects_its_tile() {
    let deck = start_deck(desktop_region(50.0).build());
    deck.handle.show(
        "broken",
        TileSettingsBuilder::new(&cpu_uid(), 3).divisor("watts").build(),
    );
    deck.handle
        .show("power", TileSettingsBuilder::new(&cpu_uid(), 3).build());

    assert!(common::wait_until(|| has_image(&deck.transport.snapshot(), "power", "65 W")));
    assert!(!deck
        .transport
        .snapshot()
        .iter()
        .any(|d| matches!(d, Delivery::Image(c, _) if c == "broken")));
}

#[test]
fn test_catalog_for_configuration_surface() {
    let deck = start_deck(desktop_region(50.0).build());
    deck.handle
        .show("t", TileSettingsBuilder::new(&gpu_uid(), 1).build());
    deck.handle.request_catalog("t");

    assert!(common::wait_until(|| {
        deck.transport.snapshot().iter().any(|d| match d {
            Delivery::Event(c, TileEvent::Catalog { sensors, readings }) => {
                c == "t"
                    && sensors.len() == 2
                    && readings.len() == 2
                    && readings.iter().all(|r| r.sensor_uid == gpu_uid())
            }
            _ => false,
        })
    }));
}

#[test]
fn test_removed_tile_is_not_rendered() {
    let deck = start_deck(desktop_region(50.0).build());
    deck.handle
        .show("gone", TileSettingsBuilder::new(&cpu_uid(), 1).build());
    assert!(common::wait_until(|| has_image(&deck.transport.snapshot(), "gone", "50 °C")));

    deck.handle.remove("gone");
    deck.handle.refresh_now();
    std::thread::sleep(Duration::from_millis(50));
    deck.transport.take();
    std::thread::sleep(Duration::from_millis(60));

    assert!(deck.transport.take().is_empty());
}
