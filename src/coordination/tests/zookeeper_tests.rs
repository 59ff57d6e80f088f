use super::*;

#[test]
fn test_requests_fail_fast_unless_connected() {
    assert!(ensure_usable(zk::SessionState::SyncConnected).is_ok());
    assert!(ensure_usable(zk::SessionState::ConnectedReadOnly).is_ok());

    assert_eq!(
        ensure_usable(zk::SessionState::Disconnected),
        Err(SessionError::NotConnected),
        "a transient disconnect must not queue the request"
    );
}

#[test]
fn test_ended_sessions_are_terminated() {
    for state in [
        zk::SessionState::Expired,
        zk::SessionState::Closed,
        zk::SessionState::AuthFailed,
    ] {
        assert!(is_terminal(state));
        assert!(matches!(
            ensure_usable(state),
            Err(SessionError::Terminated(_))
        ));
    }
    assert!(!is_terminal(zk::SessionState::Disconnected));
}

#[test]
fn test_error_mapping() {
    assert_eq!(
        map_error(zk::Error::NodeExists, "/org/svc"),
        SessionError::NodeExists("/org/svc".to_string())
    );
    assert_eq!(
        map_error(zk::Error::NoNode, "/org"),
        SessionError::NoNode("/org".to_string())
    );
    assert_eq!(
        map_error(zk::Error::ConnectionLoss, "/org"),
        SessionError::NotConnected
    );
    assert!(matches!(
        map_error(zk::Error::SessionExpired, "/org"),
        SessionError::Terminated(_)
    ));
}
