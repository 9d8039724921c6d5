use ivrkit::demo::{self, DemoContext};
use ivrkit::simulator::SimulatorMessage;
use ivrkit::{
    BlockingLine, CallAnalysis, LineManager, LineStatus, MultiTryPromptOptions, Simulator,
    VoiceProperties,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

fn properties() -> VoiceProperties {
    VoiceProperties {
        digits_timeout_ms: 200,
        dial_timeout_ms: 2000,
        ..Default::default()
    }
}

async fn expect(replies: &mut Lines<BufReader<OwnedReadHalf>>, line: &str) {
    let got = tokio::time::timeout(Duration::from_secs(5), replies.next_line())
        .await
        .expect("simulator went quiet")
        .unwrap();
    assert_eq!(got.as_deref(), Some(line));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_demo_call_over_tcp() {
    let simulator = Arc::new(Simulator::new(properties()));
    let addr = simulator.listen("127.0.0.1:0").await.unwrap();
    let manager = Arc::new(LineManager::new(simulator.clone()));

    let line = manager.get_next_line().unwrap();
    assert_eq!(line.line_number(), 1);
    let mut line = BlockingLine::new(line, Handle::current());
    let worker = std::thread::spawn(move || {
        let mut calls = 0;
        loop {
            let result = match line.wait_rings(1) {
                Ok(()) => line.run_script(demo::welcome(DemoContext::default())),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => calls += 1,
                Err(e) if e.is_terminal() => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        line.dispose().unwrap();
        calls
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut replies = BufReader::new(reader).lines();
    writer.write_all(b"CONNECT 5551234\nCALL 1\n").await.unwrap();
    expect(&mut replies, "OK").await;
    expect(&mut replies, "OK").await;
    expect(&mut replies, "PLAY welcome.wav").await;
    expect(&mut replies, "PLAY main-menu.wav").await;

    writer.write_all(b"DIGITS 3\n").await.unwrap();
    expect(&mut replies, "OK").await;
    expect(&mut replies, "PLAY goodbye.wav").await;
    expect(&mut replies, "HANGUP").await;

    manager.release_all();
    let calls = tokio::task::spawn_blocking(move || worker.join().unwrap())
        .await
        .unwrap();
    assert_eq!(calls, 1);
    manager.dispose().unwrap();
}

#[tokio::test]
async fn test_outbound_dial_to_answering_machine() {
    let simulator = Arc::new(Simulator::new(properties()));
    let manager = LineManager::new(simulator.clone());
    let mut line = manager.get_line(4).unwrap();
    let cancel = CancellationToken::new();

    let mut phone = simulator.attach_phone("5550100").unwrap();
    let machine = tokio::spawn(async move {
        assert_eq!(phone.recv().await, Some(SimulatorMessage::Dial(4)));
        assert_eq!(
            phone.send(ivrkit::simulator::PhoneCommand::Machine),
            SimulatorMessage::Connected(4)
        );
        assert_eq!(
            phone.recv().await,
            Some(SimulatorMessage::Play("leave-message.wav".to_string()))
        );
        phone.press("7");
        phone
    });

    let result = line
        .dial("5550100", Duration::from_millis(4000), &cancel)
        .await
        .unwrap();
    assert_eq!(result, CallAnalysis::AnsweringMachine);
    assert_eq!(line.status(), LineStatus::Connected);

    line.play_file("leave-message.wav", &cancel).await.unwrap();
    let mut phone = machine.await.unwrap();

    let options = MultiTryPromptOptions {
        max_length: 1,
        max_attempts: Some(2),
        ..Default::default()
    };
    // the buffered 7 skips the prompt and answers it
    let answer = line
        .multi_try_prompt("press-any-key.wav", None, &options, &cancel)
        .await
        .unwrap();
    assert_eq!(answer, "7");

    line.dispose().await.unwrap();
    assert_eq!(line.status(), LineStatus::Closed);
    assert_eq!(phone.recv().await, Some(SimulatorMessage::Hangup));
    manager.dispose().unwrap();
}
