//! Integration tests for the input-context broker.
//!
//! # Purpose
//!
//! These tests drive [`InputContextBroker`] through its public API the way
//! the socket transport and the input method do, with recording doubles in
//! place of sockets, plugins and the toolbar registry. They verify:
//!
//! - Focus hand-over between connections, including the capability pushes
//!   and the activation-lost notice sent to the previous owner.
//! - Teardown of the active connection.
//! - Toolbar self-registration driven by widget information.
//! - Ownership checks on toolbar calls.
//! - Malformed state buffers leaving the previous snapshot untouched.
//!
//! # Message flow
//!
//! ```text
//! Input context A            Broker                     Targets
//! ───────────────            ──────                     ───────
//! activateContext  ───────►  push capabilities ──► A
//!                            clientChanged      ───────► all
//! updateWidgetInformation ►  replace state
//!                            focusChanged / setToolbar / update ► all
//! ```

use std::sync::Arc;
use std::time::Duration;

use imserver::application::broker::{BrokerEvent, InputContextBroker};
use imserver::application::connection_registry::ConnectionId;
use imserver::application::mock::{
    RecordingChannel, RecordingHost, RecordingTarget, RecordingToolbarRegistry, RegistryCall,
    TargetEvent,
};
use imserver::application::targets::TargetList;
use imserver_core::protocol::messages::ContextMessage;
use imserver_core::protocol::variant::serialize_variant;
use imserver_core::{ToolbarId, Variant, VariantMap, WidgetAttribute, WidgetState};

// ── Fixture ───────────────────────────────────────────────────────────────────

struct Harness {
    broker: InputContextBroker,
    targets: TargetList,
    first: RecordingTarget,
    second: RecordingTarget,
    registry: RecordingToolbarRegistry,
}

impl Harness {
    /// A broker with two recording targets attached.
    fn new() -> Self {
        let targets = TargetList::new();
        let first = RecordingTarget::new();
        let second = RecordingTarget::new();
        targets.add(Arc::new(first.clone()));
        targets.add(Arc::new(second.clone()));
        let registry = RecordingToolbarRegistry::new();
        let broker = InputContextBroker::new(
            Arc::new(registry.clone()),
            targets.clone(),
            Arc::new(RecordingHost::new()),
            Duration::from_millis(50),
        );
        Self {
            broker,
            targets,
            first,
            second,
            registry,
        }
    }

    fn connect(&mut self) -> (ConnectionId, Arc<RecordingChannel>) {
        let channel = Arc::new(RecordingChannel::new());
        let id = self.broker.register_connection(channel.clone());
        (id, channel)
    }

    fn call(&mut self, connection: ConnectionId, message: ContextMessage) {
        let _ = self.broker.handle_event(BrokerEvent::Call {
            connection,
            message,
        });
    }

    fn clear_targets(&self) {
        self.first.clear();
        self.second.clear();
    }
}

fn state_buffer(state: &WidgetState) -> Vec<u8> {
    serialize_variant(&Variant::Map(state.to_variant_map())).expect("serialize state")
}

// ── Properties ────────────────────────────────────────────────────────────────

#[test]
fn test_identities_are_sequential_from_zero() {
    let mut h = Harness::new();

    let ids: Vec<ConnectionId> = (0..5).map(|_| h.connect().0).collect();

    assert_eq!(ids, (0..5).map(ConnectionId).collect::<Vec<_>>());
}

#[test]
fn test_identities_are_not_reused_after_disconnect() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();

    // Act
    let _ = h.broker.handle_event(BrokerEvent::Disconnected(a));
    let (b, _) = h.connect();

    // Assert
    assert_eq!(a, ConnectionId(0));
    assert_eq!(b, ConnectionId(1));
}

#[test]
fn test_at_most_one_connection_is_active() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let (b, _) = h.connect();
    let (c, _) = h.connect();

    // Act / Assert
    assert_eq!(h.broker.current_active(), None);
    for (id, expected) in [(a, Some(a)), (b, Some(b)), (c, Some(c)), (a, Some(a))] {
        h.call(id, ContextMessage::ActivateContext);
        assert_eq!(h.broker.current_active(), expected);
    }
    let _ = h.broker.handle_event(BrokerEvent::Disconnected(b));
    assert_eq!(h.broker.current_active(), Some(a));
    let _ = h.broker.handle_event(BrokerEvent::Disconnected(a));
    assert_eq!(h.broker.current_active(), None);
}

#[test]
fn test_focus_update_notifies_focus_then_update_exactly_once() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let state = WidgetState::new()
        .with(WidgetAttribute::FocusState, true)
        .with(WidgetAttribute::ContentType, 2);

    // Act
    h.call(
        a,
        ContextMessage::UpdateWidgetInformation {
            state: state_buffer(&state),
            focus_changed: true,
        },
    );

    // Assert
    for target in [&h.first, &h.second] {
        assert_eq!(
            target.events(),
            vec![TargetEvent::FocusChanged(true), TargetEvent::Update]
        );
    }
}

// ── Scenario 1: activation hand-over ──────────────────────────────────────────

#[test]
fn test_activation_pushes_capabilities_and_notifies_previous_owner() {
    // Arrange
    let mut h = Harness::new();
    let (a, channel_a) = h.connect();
    let (b, channel_b) = h.connect();

    // Act: A activates
    h.call(a, ContextMessage::ActivateContext);

    // Assert
    assert_eq!(
        channel_a.sent(),
        vec![
            ContextMessage::SetGlobalCorrectionEnabled(false),
            ContextMessage::SetRedirectKeys(false),
            ContextMessage::DetectableAutoRepeat(false),
        ]
    );

    // Act: B takes over
    channel_a.clear();
    h.call(b, ContextMessage::ActivateContext);

    // Assert
    assert_eq!(channel_a.sent(), vec![ContextMessage::ActivationLostEvent]);
    assert_eq!(channel_b.sent().len(), 3);
    assert_eq!(h.broker.current_active(), Some(b));
    assert_eq!(
        h.first.events(),
        vec![TargetEvent::ClientChanged, TargetEvent::ClientChanged]
    );
}

// ── Scenario 2: active connection goes away ───────────────────────────────────

#[test]
fn test_disconnect_of_active_clears_focus_and_notifies_all_targets() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let (b, channel_b) = h.connect();
    h.call(a, ContextMessage::ActivateContext);
    h.call(b, ContextMessage::ActivateContext);
    h.clear_targets();

    // Act
    let _ = h.broker.handle_event(BrokerEvent::Disconnected(b));

    // Assert
    assert_eq!(h.broker.current_active(), None);
    assert_eq!(h.first.events(), vec![TargetEvent::ClientChanged]);
    assert_eq!(h.second.events(), vec![TargetEvent::ClientChanged]);
    assert!(channel_b.is_closed());
    assert_eq!(h.broker.connection_count(), 1);
}

#[test]
fn test_late_call_after_disconnect_is_ignored() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let _ = h.broker.handle_event(BrokerEvent::Disconnected(a));

    // Act
    h.call(a, ContextMessage::ActivateContext);

    // Assert
    assert_eq!(h.broker.current_active(), None);
    assert!(h.first.events().is_empty());
}

// ── Scenario 3: toolbar self-registration ─────────────────────────────────────

#[test]
fn test_widget_update_registers_unknown_toolbar_and_shows_it() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let state = WidgetState::new()
        .with(WidgetAttribute::ToolbarId, 5)
        .with(WidgetAttribute::Toolbar, "bar.xml");

    // Act
    h.call(
        a,
        ContextMessage::UpdateWidgetInformation {
            state: state_buffer(&state),
            focus_changed: false,
        },
    );

    // Assert
    let expected = ToolbarId::new(5, "0");
    assert_eq!(
        h.registry.calls(),
        vec![RegistryCall::Register(expected.clone(), "bar.xml".into())]
    );
    assert_eq!(
        h.first.events(),
        vec![
            TargetEvent::SetToolbar(Some(expected.clone())),
            TargetEvent::Update
        ]
    );
    assert_eq!(h.broker.widget_state().toolbar_id(), &expected);
    assert!(h.broker.toolbars().owns(&expected));
}

#[test]
fn test_repeated_toolbar_id_does_not_notify_again() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let state = WidgetState::new()
        .with(WidgetAttribute::ToolbarId, 5)
        .with(WidgetAttribute::Toolbar, "bar.xml");
    h.broker.update_widget_information(a, state.clone(), false);
    h.clear_targets();

    // Act
    h.broker.update_widget_information(a, state, false);

    // Assert
    assert_eq!(h.first.events(), vec![TargetEvent::Update]);
    assert_eq!(h.registry.calls().len(), 1);
}

#[test]
fn test_known_toolbar_is_not_registered_again() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    h.call(
        a,
        ContextMessage::RegisterToolbar {
            id: 5,
            descriptor_path: "bar.xml".into(),
        },
    );

    // Act
    h.broker.update_widget_information(
        a,
        WidgetState::new()
            .with(WidgetAttribute::ToolbarId, 5)
            .with(WidgetAttribute::Toolbar, "other.xml"),
        false,
    );

    // Assert
    assert_eq!(h.registry.calls().len(), 1, "registry already knew (5, \"0\")");
    assert_eq!(
        h.first.events(),
        vec![
            TargetEvent::SetToolbar(Some(ToolbarId::new(5, "0"))),
            TargetEvent::Update
        ]
    );
}

#[test]
fn test_dropping_toolbar_sends_empty_toolbar() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    h.broker.update_widget_information(
        a,
        WidgetState::new()
            .with(WidgetAttribute::ToolbarId, 1)
            .with(WidgetAttribute::Toolbar, "a.xml"),
        false,
    );
    h.clear_targets();

    // Act
    h.broker
        .update_widget_information(a, WidgetState::new(), false);

    // Assert
    assert_eq!(
        h.first.events(),
        vec![TargetEvent::SetToolbar(None), TargetEvent::Update]
    );
    assert_eq!(h.broker.widget_state().toolbar_id(), &ToolbarId::default());
}

#[test]
fn test_toolbar_without_descriptor_is_looked_up_but_not_registered() {
    let mut h = Harness::new();
    let (a, _) = h.connect();

    h.broker.update_widget_information(
        a,
        WidgetState::new().with(WidgetAttribute::ToolbarId, 3),
        false,
    );

    assert!(h.registry.calls().is_empty());
    assert_eq!(
        h.first.events(),
        vec![TargetEvent::SetToolbar(None), TargetEvent::Update]
    );
}

// ── Scenario 4: foreign toolbar ids ───────────────────────────────────────────

#[test]
fn test_attribute_for_unregistered_toolbar_never_reaches_registry() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let (b, _) = h.connect();
    h.call(
        b,
        ContextMessage::RegisterToolbar {
            id: 7,
            descriptor_path: "b.xml".into(),
        },
    );
    let value = serialize_variant(&Variant::Bool(false)).unwrap();

    // Act: A uses an id only B registered, then an id nobody registered
    for id in [7, 8] {
        h.call(
            a,
            ContextMessage::SetToolbarItemAttribute {
                id,
                item: "send".into(),
                attribute: "enabled".into(),
                value: value.clone(),
            },
        );
    }
    h.call(a, ContextMessage::UnregisterToolbar { id: 7 });

    // Assert
    assert_eq!(
        h.registry.calls(),
        vec![RegistryCall::Register(ToolbarId::new(7, "1"), "b.xml".into())]
    );
}

#[test]
fn test_owner_can_update_and_unregister_its_toolbar() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    h.call(
        a,
        ContextMessage::RegisterToolbar {
            id: 2,
            descriptor_path: "chat.xml".into(),
        },
    );

    // Act
    h.call(
        a,
        ContextMessage::SetToolbarItemAttribute {
            id: 2,
            item: "send".into(),
            attribute: "text".into(),
            value: serialize_variant(&Variant::from("Go")).unwrap(),
        },
    );
    h.call(a, ContextMessage::UnregisterToolbar { id: 2 });

    // Assert
    let id = ToolbarId::new(2, "0");
    assert_eq!(
        h.registry.calls(),
        vec![
            RegistryCall::Register(id.clone(), "chat.xml".into()),
            RegistryCall::SetItemAttribute(
                id.clone(),
                "send".into(),
                "text".into(),
                Variant::String("Go".into())
            ),
            RegistryCall::Unregister(id),
        ]
    );
}

#[test]
fn test_disconnect_releases_toolbars_owned_by_the_connection() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let (b, _) = h.connect();
    for (connection, path) in [(a, "a.xml"), (b, "b.xml")] {
        h.call(
            connection,
            ContextMessage::RegisterToolbar {
                id: 1,
                descriptor_path: path.into(),
            },
        );
    }

    // Act
    let _ = h.broker.handle_event(BrokerEvent::Disconnected(a));

    // Assert
    assert_eq!(
        h.registry.calls().last(),
        Some(&RegistryCall::Unregister(ToolbarId::new(1, "0")))
    );
    assert!(!h.broker.toolbars().owns(&ToolbarId::new(1, "0")));
    assert!(h.broker.toolbars().owns(&ToolbarId::new(1, "1")));
}

// ── Scenario 5: malformed state ───────────────────────────────────────────────

#[test]
fn test_malformed_state_map_keeps_prior_snapshot() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let prior = WidgetState::new()
        .with(WidgetAttribute::FocusState, true)
        .with(WidgetAttribute::SurroundingText, "hello")
        .with(WidgetAttribute::CursorPosition, 5);
    h.call(
        a,
        ContextMessage::UpdateWidgetInformation {
            state: state_buffer(&prior),
            focus_changed: true,
        },
    );
    h.clear_targets();

    // Act
    h.call(
        a,
        ContextMessage::UpdateWidgetInformation {
            state: vec![0xde, 0xad, 0xbe, 0xef, 0x01],
            focus_changed: true,
        },
    );

    // Assert
    assert_eq!(*h.broker.widget_state().current(), prior);
    assert_eq!(
        h.broker.widget_state().current().surrounding_text(),
        Some(("hello".to_string(), 5))
    );
    assert!(h.first.events().is_empty());
}

#[test]
fn test_unknown_state_keys_are_ignored() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let mut map = VariantMap::new();
    map.insert("focusState".into(), Variant::Bool(true));
    map.insert("someFutureAttribute".into(), Variant::Int(1));
    let buffer = serialize_variant(&Variant::Map(map)).unwrap();

    // Act
    h.call(
        a,
        ContextMessage::UpdateWidgetInformation {
            state: buffer,
            focus_changed: true,
        },
    );

    // Assert
    assert_eq!(h.broker.widget_state().current().len(), 1);
    assert_eq!(h.first.events()[0], TargetEvent::FocusChanged(true));
}

// ── Observer list ─────────────────────────────────────────────────────────────

#[test]
fn test_target_removed_between_rounds_stops_receiving() {
    // Arrange
    let mut h = Harness::new();
    let (a, _) = h.connect();
    let extra = RecordingTarget::new();
    let extra_id = h.targets.add(Arc::new(extra.clone()));
    h.call(a, ContextMessage::Reset);

    // Act
    h.targets.remove(extra_id);
    h.call(a, ContextMessage::Reset);

    // Assert
    assert_eq!(extra.events(), vec![TargetEvent::Reset]);
    assert_eq!(h.first.events(), vec![TargetEvent::Reset, TargetEvent::Reset]);
}
