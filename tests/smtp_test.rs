//! SMTP conversations against a running service.

mod common;

use common::{localhost, start_service, LineClient, VERSION};

#[tokio::test]
async fn greeting_is_sent_before_any_input() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;

    let mut client = LineClient::connect(smtp).await;
    assert_eq!(client.read_raw().await.as_deref(), Some("220 Service ready\r\n"));

    service.stop().await;
}

#[tokio::test]
async fn accepted_commands_reply_ok() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;
    let mut client = LineClient::connect(smtp).await;
    client.read().await;

    for line in [
        "EHLO client.example",
        "HELO client.example",
        "MAIL FROM:<jane.doe@acme.com>",
        "RCPT TO:<john.doe@acme.com>",
        "NOOP",
        "RSET",
    ] {
        assert_eq!(client.command(line).await, "250 OK", "reply to {}", line);
    }

    service.stop().await;
}

#[tokio::test]
async fn full_mail_transaction() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;
    let mut client = LineClient::connect(smtp).await;
    client.read().await;

    assert_eq!(client.command("EHLO me").await, "250 OK");
    assert_eq!(client.command("MAIL FROM:<a@example.com>").await, "250 OK");
    assert_eq!(client.command("RCPT TO:<b@example.com>").await, "250 OK");
    assert_eq!(
        client.command("data").await,
        "354 Start mail input; end with <CRLF>.<CRLF>"
    );

    client.send("Subject: test").await;
    client.send("").await;
    client.send("QUIT").await;
    client.send(" .").await;
    client.send("..").await;
    assert_eq!(client.command(".").await, "250 OK");

    // Anything still buffered from the data lines would show up here.
    assert_eq!(client.command("NOOP").await, "250 OK");

    assert_eq!(
        client.command("QUIT").await,
        "221 Service closing transmission channel"
    );
    assert!(client.is_closed().await);

    service.stop().await;
}

#[tokio::test]
async fn odd_commands() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;
    let mut client = LineClient::connect(smtp).await;
    client.read().await;

    assert_eq!(client.command("EXPN staff").await, "550 Unknown mailing list");
    assert_eq!(client.command("EXPN").await, "500 Unknown command");
    assert_eq!(
        client.command("VRFY bob").await,
        "252 Cannot VRFY user, but will accept message and attempt delivery"
    );
    assert_eq!(
        client.command("help").await,
        format!("221 Service provided by NoopSMTP Server {}", VERSION)
    );
    assert_eq!(client.command("FOO BAR").await, "500 Unknown command");
    assert_eq!(client.command("NOOP").await, "250 OK");

    service.stop().await;
}

#[tokio::test]
async fn sessions_do_not_share_state() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;
    let mut first = LineClient::connect(smtp).await;
    let mut second = LineClient::connect(smtp).await;
    first.read().await;
    second.read().await;

    assert!(first.command("DATA").await.starts_with("354"));
    assert_eq!(second.command(".").await, "500 Unknown command");
    assert_eq!(first.command(".").await, "250 OK");

    service.stop().await;
}

#[tokio::test]
async fn non_ascii_input_closes_only_that_connection() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;
    let mut bad = LineClient::connect(smtp).await;
    let mut good = LineClient::connect(smtp).await;
    bad.read().await;
    good.read().await;

    bad.send_raw("HELO caf\u{e9}\r\n".as_bytes()).await;
    assert!(bad.is_closed().await);

    assert_eq!(good.command("HELO ok").await, "250 OK");

    service.stop().await;
}

#[tokio::test]
async fn overlong_line_is_dropped_without_reply() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;
    let mut client = LineClient::connect(smtp).await;
    client.read().await;

    let long = format!("HELO {}\r\n", "x".repeat(4096));
    client.send_raw(long.as_bytes()).await;
    assert_eq!(client.command("NOOP").await, "250 OK");

    service.stop().await;
}

#[tokio::test]
async fn bare_lf_does_not_end_a_line() {
    let (service, smtp, _) = start_service(localhost(), localhost()).await;
    let mut client = LineClient::connect(smtp).await;
    client.read().await;

    client.send_raw(b"NOOP\nNOOP\r\n").await;
    assert_eq!(client.read().await.as_deref(), Some("500 Unknown command"));

    service.stop().await;
}
