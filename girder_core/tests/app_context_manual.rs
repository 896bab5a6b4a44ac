mod common;

use crate::common::context::QuitListeners;
use girder_core::AppContext;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn manual_termination_releases_listeners() {
    // Given
    let mut listeners = QuitListeners::new();
    listeners.spawn().await;
    listeners.spawn().await;

    // Then
    listeners.assert_all_waiting();
    assert_eq!(AppContext::is_alive(), true);

    // When
    AppContext::terminate();
    AppContext::terminate();
    tokio::task::yield_now().await;

    // Then
    listeners.assert_all_released();
    assert_eq!(AppContext::is_terminated(), true);

    // A late listener is released immediately
    AppContext::terminated().await;
}
