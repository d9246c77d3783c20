use super::*;
use crate::config::HardwareConfig;
use crate::error::HardwareError;
use crate::media::MediaKind;

fn test_config() -> HardwareConfig {
    HardwareConfig {
        path: "/dev/ttyACM0".to_string(),
        baud_rate: 9600,
    }
}

#[test]
fn test_signal_code_wire_bytes() {
    assert_eq!(SignalCode::Off.as_byte(), b'0');
    assert_eq!(SignalCode::On.as_byte(), b'1');
    assert_eq!(SignalCode::Off.as_char(), '0');
    assert_eq!(SignalCode::On.as_char(), '1');
}

#[test]
fn test_signal_code_validation() {
    assert_eq!(SignalCode::try_from('0').unwrap(), SignalCode::Off);
    assert_eq!(SignalCode::try_from('1').unwrap(), SignalCode::On);

    for raw in ['2', 'x', ' ', '\n'] {
        match SignalCode::try_from(raw) {
            Err(HardwareError::InvalidCode { code }) => assert_eq!(code, raw),
            other => panic!("Expected InvalidCode for {:?}, got {:?}", raw, other.is_ok()),
        }
    }
}

#[test]
fn test_codes_distinct_per_kind() {
    let image_code = SignalCode::for_kind(MediaKind::Image);
    let video_code = SignalCode::for_kind(MediaKind::Video);
    assert_ne!(image_code, video_code);
    assert_eq!(video_code, SignalCode::On);
}

#[tokio::test]
async fn test_write_while_closed_fails_fast() {
    let client = SignalClient::new(test_config());
    assert!(!client.is_open());

    let err = client.signal(SignalCode::On).await.unwrap_err();
    assert!(matches!(err, HardwareError::DeviceUnavailable));
}

#[tokio::test]
async fn test_closed_write_leaves_lock_usable() {
    let client = SignalClient::new(test_config());

    // Repeated failures must not poison or hold the write lock
    for _ in 0..3 {
        let err = client.signal(SignalCode::Off).await.unwrap_err();
        assert!(matches!(err, HardwareError::DeviceUnavailable));
    }

    // Invalid codes are still rejected before the device is consulted
    let err = client.signal_char('7').await.unwrap_err();
    assert!(matches!(err, HardwareError::InvalidCode { code: '7' }));
}

#[tokio::test]
async fn test_invalid_code_rejected_before_transmission() {
    let client = SignalClient::new(test_config());

    // InvalidCode wins over DeviceUnavailable: validation happens first
    let err = client.signal_char('9').await.unwrap_err();
    assert!(matches!(err, HardwareError::InvalidCode { code: '9' }));
}

#[tokio::test]
async fn test_close_without_connect_is_noop() {
    let client = SignalClient::new(test_config());
    client.close().await;
    assert!(!client.is_open());
}
