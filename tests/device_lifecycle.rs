use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

use malcolm::{
    AttributeValue, BroadcastPublisher, CallMethod, ConnectionError, DeviceState,
    FakeConnection, FakeDeviceConfig, MalcolmDevice, MalcolmError, MalcolmModel, MalcolmVersion,
    MessageType, PointGenerator, Position,
};

const DEVICE: &str = "BL45P-ML-SCAN-01";

fn device_for(connection: &Arc<FakeConnection>) -> MalcolmDevice {
    MalcolmDevice::builder()
        .name(DEVICE)
        .connection(Arc::clone(connection) as _)
        .publisher(Arc::new(BroadcastPublisher::new()) as _)
        .build()
}

fn fake(config: FakeDeviceConfig) -> Arc<FakeConnection> {
    Arc::new(FakeConnection::new(config))
}

fn grid(points: u64) -> PointGenerator {
    PointGenerator::builder()
        .axes(vec!["stage_y".to_string(), "stage_x".to_string()])
        .duration(0.5)
        .size(points)
        .build()
}

#[tokio::test]
async fn initialize_seeds_state_and_subscribes_to_state_and_progress() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().state(DeviceState::Armed).build());
    let device = device_for(&connection);

    device.initialize().await?;

    assert!(device.is_alive());
    assert_eq!(Some(DeviceState::Armed), device.cached_state());
    let endpoints: Vec<Option<String>> = connection
        .subscriptions()
        .iter()
        .map(|subscription| subscription.endpoint().map(String::from))
        .collect();
    assert_eq!(
        vec![Some("state".to_string()), Some("completedSteps".to_string())],
        endpoints
    );
    Ok(())
}

#[tokio::test]
async fn initialize_twice_is_rejected() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);
    device.initialize().await?;

    let result = device.initialize().await;

    assert_matches!(result, Err(MalcolmError::AlreadyInitialised { device }) if device == DEVICE);
    Ok(())
}

#[tokio::test]
async fn initialize_against_closed_connection_leaves_device_offline() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::default());
    connection.set_connected(false).await;
    let device = device_for(&connection);

    let result = device.initialize().await;

    assert_matches!(
        result,
        Err(MalcolmError::Connection(ConnectionError::Closed { .. }))
    );
    assert!(!device.is_alive());
    assert!(connection.subscriptions().is_empty());
    Ok(())
}

#[tokio::test]
async fn replies_are_correlated_with_requests() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().version("4.2.1").build());
    let device = device_for(&connection);
    device.initialize().await?;

    device.get_device_health().await?;
    device.get_version().await?;

    let ids: Vec<u64> = connection
        .sent()
        .iter()
        .map(|sent| sent.message().id())
        .collect();
    assert_eq!(3, ids.len());
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(connection.sent().iter().all(|sent| sent.device() == DEVICE));
    Ok(())
}

#[tokio::test]
async fn dispose_unsubscribes_with_original_subscription_ids() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);
    device.initialize().await?;
    let subscriptions = connection.subscriptions();

    device.dispose().await?;

    let unsubscribed = connection.unsubscribed();
    assert_eq!(2, unsubscribed.len());
    for (subscription, teardown) in subscriptions.iter().zip(&unsubscribed) {
        assert_eq!(subscription.id(), teardown.id());
        assert_eq!(subscription.endpoint(), teardown.endpoint());
        assert_eq!(MessageType::Unsubscribe, teardown.message_type());
    }
    assert!(!device.is_alive());
    assert!(!connection.is_connected());
    Ok(())
}

#[tokio::test]
async fn second_dispose_repeats_teardown_and_fails() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);
    device.initialize().await?;
    device.dispose().await?;

    let result = device.dispose().await;

    assert_matches!(
        result,
        Err(MalcolmError::Connection(ConnectionError::UnknownSubscription { .. }))
    );
    Ok(())
}

#[rstest]
#[case::ready(DeviceState::Ready, false)]
#[case::armed(DeviceState::Armed, false)]
#[case::finished(DeviceState::Finished, false)]
#[case::running(DeviceState::Running, true)]
#[case::configuring(DeviceState::Configuring, true)]
#[case::seeking(DeviceState::Seeking, true)]
#[tokio::test]
async fn busy_is_derived_from_fresh_state(
    #[case] state: DeviceState,
    #[case] expected: bool,
) -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().state(state).build());
    let device = device_for(&connection);

    assert_eq!(expected, device.is_device_busy().await?);
    Ok(())
}

#[rstest]
#[case(CallMethod::Run)]
#[case(CallMethod::Pause)]
#[case(CallMethod::Resume)]
#[case(CallMethod::Abort)]
#[case(CallMethod::Reset)]
#[case(CallMethod::Disable)]
#[tokio::test]
async fn error_replies_surface_with_standard_prefix(#[case] method: CallMethod) {
    let connection = fake(FakeDeviceConfig::builder().state(DeviceState::Paused).build());
    connection.fail_method(method, "Can't do that now");
    let device = device_for(&connection);

    let result = match method {
        CallMethod::Run => device.run(None).await,
        CallMethod::Pause => device.pause().await,
        CallMethod::Resume => device.resume().await,
        CallMethod::Abort => device.abort().await,
        CallMethod::Reset => device.reset().await,
        CallMethod::Disable => device.disable().await,
        other => panic!("no operation for {other}"),
    };

    let error = result.expect_err("ERROR reply should fail the operation");
    assert_eq!(
        "Error from Malcolm Device Connection: Can't do that now",
        error.to_string()
    );
}

#[tokio::test]
async fn seek_is_sent_as_pause_with_completed_steps() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().state(DeviceState::Armed).build());
    let device = device_for(&connection);

    device.seek(31).await?;

    let sent = connection.sent();
    let call = sent
        .iter()
        .map(|sent| sent.message())
        .find(|message| message.message_type() == MessageType::Call)
        .expect("seek should send a CALL");
    assert_eq!(Some(CallMethod::Pause), call.method());
    assert_eq!(Some(&json!({ "completedSteps": 31 })), call.arguments());
    assert_eq!(DeviceState::Paused, connection.state());
    Ok(())
}

#[tokio::test]
async fn run_passes_start_position() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().state(DeviceState::Paused).build());
    let device = device_for(&connection);

    device
        .run(Some(&Position::new(4).with_axis("stage_x", 1.25)))
        .await?;

    let sent = connection.sent();
    let arguments = sent
        .last()
        .and_then(|sent| sent.message().arguments())
        .cloned();
    assert_eq!(
        Some(json!({ "position": { "step": 4, "values": { "stage_x": 1.25 } } })),
        arguments
    );
    Ok(())
}

#[tokio::test]
async fn configure_resets_then_configures_with_packaged_parameters() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);
    device.set_point_generator(grid(12));
    device.set_file_dir("/dls/i18/data/2026/cm-1");

    device
        .configure(&MalcolmModel::builder().name("pmac").exposure_time(0.1).build())
        .await?;

    assert_eq!(
        vec![CallMethod::Reset, CallMethod::Configure],
        connection.sent_methods()
    );
    let sent = connection.sent();
    let arguments = sent
        .last()
        .and_then(|sent| sent.message().arguments())
        .cloned()
        .expect("configure should carry parameters");
    assert_eq!(
        json!({
            "fileDir": "/dls/i18/data/2026/cm-1",
            "fileTemplate": "cm-1-%s.h5",
            "axesToMove": ["stage_y", "stage_x"],
            "generator": { "axes": ["stage_y", "stage_x"], "duration": 0.1, "size": 12 }
        }),
        arguments
    );
    assert_eq!(DeviceState::Armed, connection.state());
    assert_eq!(12, device.progress().size());
    Ok(())
}

#[tokio::test]
async fn configure_proceeds_when_reset_is_refused() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::default());
    connection.fail_method(CallMethod::Reset, "Can't reset in state Disabled");
    let device = device_for(&connection);
    device.set_point_generator(grid(4));
    device.set_file_dir("/tmp");

    device
        .configure(&MalcolmModel::builder().name("pmac").build())
        .await?;

    assert_eq!(
        vec![CallMethod::Reset, CallMethod::Configure],
        connection.sent_methods()
    );
    assert_eq!(DeviceState::Armed, connection.state());
    Ok(())
}

#[tokio::test]
async fn configure_still_fails_when_configure_is_refused() {
    let connection = fake(FakeDeviceConfig::default());
    connection.fail_method(CallMethod::Reset, "Can't reset in state Disabled");
    connection.fail_method(CallMethod::Configure, "Can't configure in state Disabled");
    let device = device_for(&connection);
    device.set_point_generator(grid(4));
    device.set_file_dir("/tmp");

    let result = device
        .configure(&MalcolmModel::builder().name("pmac").build())
        .await;

    assert_matches!(
        result,
        Err(MalcolmError::Device { message }) if message == "Can't configure in state Disabled"
    );
}

#[tokio::test]
async fn default_file_template_follows_nested_file_dir() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);
    device.set_point_generator(grid(2));
    device.set_file_dir("/dls/i18/data/2026/cm-1234/ixx-1234");

    device
        .configure(&MalcolmModel::builder().name("pmac").build())
        .await?;

    let sent = connection.sent();
    let template = sent
        .last()
        .and_then(|sent| sent.message().arguments())
        .and_then(|arguments| arguments.get("fileTemplate"))
        .cloned();
    assert_eq!(Some(json!("ixx-1234-%s.h5")), template);
    Ok(())
}

#[tokio::test]
async fn configure_without_generator_sends_nothing() {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);
    device.set_file_dir("/tmp");

    let result = device
        .configure(&MalcolmModel::builder().name("pmac").build())
        .await;

    assert_matches!(result, Err(MalcolmError::MissingPointGenerator { .. }));
    assert!(connection.sent().is_empty());
}

#[tokio::test]
async fn validate_error_carries_invalid_field_names() {
    let connection = fake(FakeDeviceConfig::default());
    connection.fail_method_with_value(
        CallMethod::Validate,
        "Exposure too short",
        json!(["exposureTime"]),
    );
    let device = device_for(&connection);
    device.set_point_generator(grid(4));
    device.set_file_dir("/tmp");

    let result = device
        .validate(&MalcolmModel::builder().name("pmac").build())
        .await;

    assert_matches!(result, Err(MalcolmError::Validation(error)) => {
        assert_eq!("Exposure too short", error.message());
        assert_eq!(["exposureTime".to_string()], error.field_names());
    });
}

#[tokio::test]
async fn validate_with_return_reports_parameters_adjusted_by_device() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().minimum_duration(0.05).build());
    let device = device_for(&connection);
    device.set_point_generator(grid(4));
    device.set_file_dir("/tmp");

    let accepted = device
        .validate_with_return(&MalcolmModel::builder().name("pmac").exposure_time(0.001).build())
        .await?;

    assert_eq!(0.05, accepted.generator().duration());
    assert_eq!(["stage_y", "stage_x"], accepted.axes_to_move());
    assert_eq!(DeviceState::Ready, connection.state());
    Ok(())
}

#[tokio::test]
async fn queries_decode_typed_attributes() -> anyhow::Result<()> {
    let connection = fake(
        FakeDeviceConfig::builder()
            .health("Disk nearly full")
            .axes(vec!["energy".to_string()])
            .version("v4.2.1-rc1")
            .build(),
    );
    let device = device_for(&connection);

    assert_eq!("Disk nearly full", device.get_device_health().await?);
    assert_eq!(Some("Disk nearly full".to_string()), device.cached_health());
    assert_eq!(vec!["energy".to_string()], device.get_available_axes().await?);
    assert_eq!(vec!["energy".to_string()], device.cached_available_axes());
    assert_eq!(MalcolmVersion::new(4, 2, 1), device.get_version().await?);
    assert!(device.is_new_malcolm_version().await?);

    let datasets = device.get_datasets().await?;
    assert_eq!(["name", "type", "rank"], datasets.headings());
    assert_eq!(3, datasets.row_count());
    Ok(())
}

#[tokio::test]
async fn attributes_are_read_by_remote_name() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().health("Disk nearly full").build());
    let device = device_for(&connection);

    let health = device.get_attribute("health").await?;
    let steps = device.get_attribute("completedSteps").await?;

    assert_eq!("health", health.name());
    assert_eq!(Some("Disk nearly full"), health.as_text());
    assert_eq!(&AttributeValue::Number(0.0), steps.value());
    Ok(())
}

#[tokio::test]
async fn unknown_attribute_name_surfaces_device_error() {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);

    let result = device.get_attribute("exposure").await;

    let error = result.expect_err("unknown member should be refused");
    assert_eq!(
        "Error from Malcolm Device Connection: No such endpoint",
        error.to_string()
    );
}

#[tokio::test]
async fn unset_attribute_surfaces_device_error() {
    let connection = fake(FakeDeviceConfig::default());
    let device = device_for(&connection);

    let result = device.get_attribute("version").await;

    assert_matches!(
        result,
        Err(MalcolmError::Device { message }) if message == "No attribute version"
    );
}

#[tokio::test]
async fn all_attributes_skip_non_attribute_block_members() -> anyhow::Result<()> {
    let connection = fake(
        FakeDeviceConfig::builder()
            .state(DeviceState::Armed)
            .version("4.2.1")
            .build(),
    );
    let device = device_for(&connection);

    let attributes = device.get_all_attributes().await?;

    let mut names: Vec<&str> = attributes.iter().map(|attribute| attribute.name()).collect();
    names.sort_unstable();
    assert_eq!(
        vec![
            "busy",
            "completedSteps",
            "datasets",
            "health",
            "simultaneousAxes",
            "state",
            "version"
        ],
        names
    );
    let state = attributes
        .iter()
        .find(|attribute| attribute.name() == "state")
        .and_then(|attribute| attribute.as_text());
    assert_eq!(Some("Armed"), state);
    Ok(())
}

#[rstest]
#[case::ready(DeviceState::Ready, false)]
#[case::paused(DeviceState::Paused, false)]
#[case::fault(DeviceState::Fault, false)]
#[case::configuring(DeviceState::Configuring, true)]
#[case::running(DeviceState::Running, true)]
#[case::aborting(DeviceState::Aborting, true)]
#[tokio::test]
async fn locked_while_state_is_transient(
    #[case] state: DeviceState,
    #[case] expected: bool,
) -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().state(state).build());
    let device = device_for(&connection);

    assert_eq!(expected, device.is_locked().await?);
    assert_eq!(Some(state), device.cached_state());
    Ok(())
}

#[tokio::test]
async fn legacy_server_is_detected_and_version_falls_back() -> anyhow::Result<()> {
    let connection = fake(FakeDeviceConfig::builder().legacy_protocol(true).build());
    let device = device_for(&connection);

    assert!(!device.is_new_malcolm_version().await?);
    assert_eq!(MalcolmVersion::FALLBACK, device.get_version().await?);
    Ok(())
}

#[tokio::test]
async fn transport_failures_propagate_unchanged() {
    let connection = fake(FakeDeviceConfig::default());
    connection.set_connected(false).await;
    let device = device_for(&connection);

    let result = device.is_new_malcolm_version().await;

    assert_matches!(
        result,
        Err(MalcolmError::Connection(ConnectionError::Closed { device })) if device == DEVICE
    );
}
