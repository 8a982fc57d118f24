//! Live test against cytu.be.
//!
//! Set CYTUBE_TEST_CHANNEL to a public channel and run with `--ignored`.

use cytube_client::connect;

#[tokio::test]
#[ignore = "needs network access and CYTUBE_TEST_CHANNEL"]
async fn test_connect_to_public_channel() {
    let Ok(channel) = std::env::var("CYTUBE_TEST_CHANNEL") else {
        eprintln!("CYTUBE_TEST_CHANNEL not set, skipping");
        return;
    };

    let connection = connect(channel.as_str()).await.unwrap();
    let media = connection.get_current_media().await.unwrap();
    println!("current media: {}", media);

    assert!(!media.is_null());
    connection.close();
}
