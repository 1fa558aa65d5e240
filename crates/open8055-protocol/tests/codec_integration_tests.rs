//! Integration tests for LineCodec over Tokio streams.
//!
//! A raw client writes bytes into one end of a duplex pipe while the server
//! side reads commands through `Framed<_, LineCodec>` and answers with
//! replies, the same shape a client session uses.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

use open8055_core::Error;
use open8055_protocol::{Command, CommandParser, LineCodec, Reply};

fn create_session_pipe(buffer_size: usize) -> (DuplexStream, Framed<DuplexStream, LineCodec>) {
    let (client, server) = tokio::io::duplex(buffer_size);
    (client, Framed::new(server, LineCodec::new()))
}

#[tokio::test]
async fn test_lines_arrive_in_order() {
    let (mut client, mut server) = create_session_pipe(1024);

    client
        .write_all(b"GetInputDigital 0\r\nFlush\nWaitFor 31 -1\n")
        .await
        .unwrap();

    let first = server.next().await.unwrap().unwrap();
    let second = server.next().await.unwrap().unwrap();
    let third = server.next().await.unwrap().unwrap();

    assert_eq!(first, "GetInputDigital 0");
    assert_eq!(second, "Flush");
    assert_eq!(
        CommandParser::parse(&third).unwrap().tag(),
        open8055_protocol::CommandTag::WaitFor
    );
}

#[tokio::test]
async fn test_command_split_over_many_writes() {
    let (mut client, mut server) = create_session_pipe(64);

    let reader = tokio::spawn(async move { server.next().await.unwrap().unwrap() });

    for chunk in [&b"SetOut"[..], b"putPWM ", b"1 5", b"12\n"] {
        client.write_all(chunk).await.unwrap();
        tokio::task::yield_now().await;
    }

    let line = reader.await.unwrap();
    assert_eq!(
        CommandParser::parse(&line).unwrap(),
        Command::SetOutputPwm(open8055_core::PwmPort::new(1).unwrap(), 512)
    );
}

#[tokio::test]
async fn test_replies_are_newline_terminated() {
    let (mut client, mut server) = create_session_pipe(1024);

    server.send(Reply::Value(1)).await.unwrap();
    server
        .send(Reply::NotRecognized("Bogus".into()))
        .await
        .unwrap();
    drop(server);

    let mut received = String::new();
    client.read_to_string(&mut received).await.unwrap();
    assert_eq!(received, "1\ncommand not recognized: Bogus\n");
}

#[tokio::test]
async fn test_overlong_line_ends_stream_with_error() {
    let (mut client, mut server) = create_session_pipe(4096);

    let mut line = vec![b'A'; 300];
    line.push(b'\n');
    client.write_all(&line).await.unwrap();

    let result = server.next().await.unwrap();
    assert!(matches!(result, Err(Error::CommandTooLong { limit: 256 })));
}

#[tokio::test]
async fn test_eof_delivers_unterminated_command() {
    let (mut client, mut server) = create_session_pipe(1024);

    client.write_all(b"Close\nGetInputDigital 2").await.unwrap();
    drop(client);

    assert_eq!(server.next().await.unwrap().unwrap(), "Close");
    assert_eq!(server.next().await.unwrap().unwrap(), "GetInputDigital 2");
    assert!(server.next().await.is_none());
}
