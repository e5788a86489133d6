use std::time::Duration;

use crate::{
    manager::PlayRequest,
    session::Status,
    test::mock::{channel, guild, Call, Harness},
};

#[tokio::test]
async fn join_connects_to_the_user_channel() {
    let harness = Harness::new();

    let response = harness.manager.join(guild(1), Some(channel())).await;

    assert_eq!(response.content(), "Connected to General");
    assert!(!response.ephemeral);
    assert_eq!(harness.status(guild(1)).await, Status::Idle);
    assert_eq!(harness.node.calls(guild(1)), vec![Call::Connect(channel().id)]);
}

#[tokio::test]
async fn join_twice_is_rejected() {
    let harness = Harness::new();
    harness.manager.join(guild(1), Some(channel())).await;

    let response = harness.manager.join(guild(1), Some(channel())).await;

    assert_eq!(response.content(), "I am already connected to a vc");
    assert!(response.ephemeral);
}

#[tokio::test]
async fn join_without_user_channel_keeps_no_session() {
    let harness = Harness::new();

    let response = harness.manager.join(guild(1), None).await;

    assert_eq!(response.content(), "You must be connected to a vc");
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn play_starts_then_enqueues() {
    let harness = Harness::new();

    let response = harness.play(guild(1), "songA").await;
    let embed = response.embed.expect("now playing embed");
    assert_eq!(embed.title.as_deref(), Some("songA"));
    assert!(embed
        .description
        .is_some_and(|d| d.starts_with("Now playing [**songA**]")));
    assert!(embed.fields.iter().any(|f| f.value == "<@10>"));

    let response = harness.play(guild(1), "songB").await;
    let embed = response.embed.expect("enqueued embed");
    assert_eq!(embed.title.as_deref(), Some("Enqueued songB"));

    assert_eq!(harness.current(guild(1)).await.as_deref(), Some("songA"));
    assert_eq!(harness.queue(guild(1)).await, vec!["songB"]);
    assert_eq!(harness.node.played(guild(1)), vec!["songA"]);
}

#[tokio::test]
async fn play_joins_when_disconnected() {
    let harness = Harness::new();

    harness.play(guild(1), "songA").await;

    assert_eq!(
        harness.node.calls(guild(1)),
        vec![Call::Connect(channel().id), Call::Play("songA".to_owned())]
    );
}

#[tokio::test]
async fn play_without_user_channel_is_rejected() {
    let harness = Harness::new();
    let request = PlayRequest {
        channel: None,
        ..Harness::request("songA")
    };

    let response = harness.manager.play(guild(1), request).await;

    assert_eq!(response.content(), "You must be connected to a vc");
    assert_eq!(harness.node.total_calls(), 0);
}

#[tokio::test]
async fn play_without_results_does_not_join() {
    let harness = Harness::new();

    let response = harness.play(guild(1), "nothing at all").await;

    assert_eq!(response.content(), "Couldn't find anything.");
    assert!(response.ephemeral);
    assert!(harness.node.calls(guild(1)).is_empty());
    assert!(!harness.registry.contains(guild(1)));
}

#[tokio::test]
async fn play_seeks_to_the_start_position() {
    let harness = Harness::new();
    let request = PlayRequest {
        start: Duration::from_secs(90),
        ..Harness::request("songA")
    };

    let response = harness.manager.play(guild(1), request).await;

    assert!(response.text.is_none());
    assert_eq!(
        harness.node.calls(guild(1)).last(),
        Some(&Call::Seek(Duration::from_secs(90)))
    );
}

#[tokio::test]
async fn play_reports_an_ignored_start_position() {
    let harness = Harness::new();
    harness.node.fail("seek");
    let request = PlayRequest {
        start: Duration::from_secs(90),
        ..Harness::request("songA")
    };

    let response = harness.manager.play(guild(1), request).await;

    assert_eq!(
        response.content(),
        "Couldn't go to 00:01:30, playing from the beginning"
    );
    assert_eq!(
        response.embed.and_then(|embed| embed.title).as_deref(),
        Some("songA")
    );
    assert_eq!(harness.current(guild(1)).await.as_deref(), Some("songA"));
}

#[tokio::test]
async fn play_rejects_start_after_the_end() {
    let harness = Harness::new();
    harness.manager.join(guild(1), Some(channel())).await;
    let request = PlayRequest {
        start: Duration::from_secs(600),
        ..Harness::request("songA")
    };

    let response = harness.manager.play(guild(1), request).await;

    assert_eq!(response.content(), "Set timecode is outside of track's length!");
    assert_eq!(harness.status(guild(1)).await, Status::Idle);
    assert!(harness.node.played(guild(1)).is_empty());
}

#[tokio::test]
async fn skip_advances_until_the_queue_is_empty() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(1), "songB").await;

    let response = harness.manager.skip(guild(1)).await;
    let embed = response.embed.expect("now playing embed");
    assert_eq!(embed.title.as_deref(), Some("songB"));
    assert!(!embed.fields.iter().any(|f| f.name == "Requested by"));

    let response = harness.manager.skip(guild(1)).await;
    assert!(response.content().starts_with("Only currently playing song is in the queue."));
    assert!(response.ephemeral);

    assert_eq!(harness.current(guild(1)).await.as_deref(), Some("songB"));
    assert!(harness.queue(guild(1)).await.is_empty());
}

#[tokio::test]
async fn skip_while_paused_is_rejected() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(1), "songB").await;
    harness.manager.pause(guild(1)).await;

    let response = harness.manager.skip(guild(1)).await;

    assert_eq!(response.content(), "Music is paused. Resume to skip.");
    assert_eq!(harness.queue(guild(1)).await, vec!["songB"]);
}

#[tokio::test]
async fn failed_skip_keeps_the_next_track_queued() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(1), "songB").await;
    harness.node.fail("play");

    let response = harness.manager.skip(guild(1)).await;

    assert_eq!(response.content(), "Error\ninjected failure");
    assert_eq!(harness.current(guild(1)).await.as_deref(), Some("songA"));
    assert_eq!(harness.queue(guild(1)).await, vec!["songB"]);
}

#[tokio::test]
async fn pause_and_resume_follow_the_state() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;

    assert_eq!(harness.manager.resume(guild(1)).await.content(), "Music is already playing");
    assert_eq!(harness.manager.pause(guild(1)).await.content(), "Paused the music");
    assert_eq!(harness.manager.pause(guild(1)).await.content(), "Music is already paused");
    assert_eq!(harness.manager.resume(guild(1)).await.content(), "Resumed the music");

    assert!(matches!(harness.status(guild(1)).await, Status::Playing(_)));
}

#[tokio::test]
async fn commands_need_a_connection() {
    let harness = Harness::new();

    for response in [
        harness.manager.resume(guild(1)).await,
        harness.manager.pause(guild(1)).await,
        harness.manager.skip(guild(1)).await,
        harness.manager.stop(guild(1)).await,
        harness.manager.leave(guild(1)).await,
        harness.manager.queue(guild(1)).await,
    ] {
        assert_eq!(response.content(), "Not connected to any voice channel!");
        assert!(response.ephemeral);
    }

    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn idle_session_has_nothing_playing() {
    let harness = Harness::new();
    harness.manager.join(guild(1), Some(channel())).await;

    let expected = "No songs in queue. Add a song with `/play` command";
    assert_eq!(harness.manager.pause(guild(1)).await.content(), expected);
    assert_eq!(harness.manager.resume(guild(1)).await.content(), expected);
    assert_eq!(harness.manager.skip(guild(1)).await.content(), expected);
    assert_eq!(harness.manager.length(guild(1)).await.content(), expected);
    assert_eq!(
        harness.manager.stop(guild(1)).await.content(),
        "Music is already stopped"
    );
}

#[tokio::test]
async fn unavailable_node_rejects_everything() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    let calls = harness.node.total_calls();
    harness.node.set_available(false);

    let expected =
        "Music service is now unavailable! Contact administrator if you have any questions.";
    for response in [
        harness.play(guild(1), "songB").await,
        harness.manager.pause(guild(1)).await,
        harness.manager.skip(guild(1)).await,
        harness.manager.queue(guild(1)).await,
        harness.manager.leave(guild(1)).await,
    ] {
        assert_eq!(response.content(), expected);
        assert!(response.ephemeral);
    }

    assert_eq!(harness.node.total_calls(), calls);
    assert_eq!(harness.current(guild(1)).await.as_deref(), Some("songA"));
}

#[tokio::test]
async fn slow_node_times_out() {
    let harness = Harness::with_timeout(Duration::from_millis(50));
    harness.play(guild(1), "songA").await;
    harness.node.set_delay(Duration::from_millis(500));

    let response = harness.manager.pause(guild(1)).await;

    assert!(response.content().starts_with("Music service is now unavailable!"));
    assert!(matches!(harness.status(guild(1)).await, Status::Playing(_)));
}

#[tokio::test]
async fn upstream_failure_keeps_the_state() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.node.fail("pause");

    let response = harness.manager.pause(guild(1)).await;

    assert_eq!(response.content(), "Error\ninjected failure");
    assert!(response.ephemeral);
    assert!(matches!(harness.status(guild(1)).await, Status::Playing(_)));
}

#[tokio::test]
async fn seek_to_zero_sends_an_offset() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;

    let response = harness.manager.seek(guild(1), Duration::ZERO).await;

    assert_eq!(response.content(), "Skipped to 00:00:00");
    assert_eq!(
        harness.node.calls(guild(1)).last(),
        Some(&Call::Seek(Duration::from_millis(1)))
    );
}

#[tokio::test]
async fn seek_after_the_end_is_rejected() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;

    let response = harness.manager.seek(guild(1), Duration::from_secs(181)).await;

    assert_eq!(response.content(), "The timecode is outside of track's length!");
}

#[tokio::test]
async fn seek_on_live_tracks_is_rejected() {
    let harness = Harness::new();
    let mut live = crate::test::mock::track("radio");
    live.seekable = false;
    harness.node.add_result("radio", live);
    harness.play(guild(1), "radio").await;

    let response = harness.manager.seek(guild(1), Duration::from_secs(10)).await;

    assert_eq!(response.content(), "Cannot go to any position on this track!");
}

#[tokio::test]
async fn remove_by_position() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(1), "songB").await;
    harness.play(guild(1), "songC").await;

    let response = harness.manager.remove(guild(1), 5).await;
    assert_eq!(
        response.content(),
        "Index is not present inside the Queue. Enter values from (1 to 2)"
    );
    assert_eq!(harness.queue(guild(1)).await, vec!["songB", "songC"]);

    let response = harness.manager.remove(guild(1), 1).await;
    assert_eq!(response.content(), "Removed the track **songB**");

    let response = harness.manager.remove(guild(1), -1).await;
    assert_eq!(response.content(), "Removed the track **songC**");

    let response = harness.manager.remove(guild(1), -1).await;
    assert_eq!(response.content(), "The queue is empty, there is nothing to remove");
}

#[tokio::test]
async fn volume_is_clamped() {
    let harness = Harness::new();
    harness.manager.join(guild(1), Some(channel())).await;

    let response = harness.manager.set_volume(guild(1), 250).await;
    assert_eq!(response.content(), "Changed volume to **100**/100");

    let response = harness.manager.set_volume(guild(1), 40).await;
    assert_eq!(response.content(), "Changed volume to **40**/100");

    let volumes: Vec<_> = harness
        .node
        .calls(guild(1))
        .into_iter()
        .filter(|call| matches!(call, Call::Volume(_)))
        .collect();
    assert_eq!(volumes, vec![Call::Volume(100), Call::Volume(40)]);
}

#[tokio::test]
async fn loop_messages() {
    let harness = Harness::new();
    harness.manager.join(guild(1), Some(channel())).await;

    let response = harness.manager.set_loop(guild(1), 0).await;
    assert_eq!(response.content(), "Cannot loop negative or zero times");

    let response = harness.manager.set_loop(guild(1), -2).await;
    assert_eq!(response.content(), "Cannot loop negative or zero times");

    let response = harness.manager.set_loop(guild(1), 3).await;
    assert_eq!(response.content(), "Music is not playing. To loop, play something first");

    harness.play(guild(1), "songA").await;

    let response = harness.manager.set_loop(guild(1), -1).await;
    assert_eq!(response.content(), "Successfully set to loop indefinitely");

    let response = harness.manager.set_loop(guild(1), 3).await;
    assert_eq!(response.content(), "Successfully reset to loop 3 times");
}

#[tokio::test]
async fn stop_clears_the_queue_and_the_loop() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(1), "songB").await;
    harness.manager.set_loop(guild(1), -1).await;

    let response = harness.manager.stop(guild(1)).await;

    assert_eq!(response.content(), "Stopped playing the music and cleared the queue");
    assert_eq!(harness.status(guild(1)).await, Status::Idle);
    assert!(harness.queue(guild(1)).await.is_empty());

    let session = harness.registry.acquire(guild(1)).await.expect("session");
    assert!(!session.looping().enabled());
}

#[tokio::test]
async fn leave_removes_the_session() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(1), "songB").await;

    let response = harness.manager.leave(guild(1)).await;

    assert_eq!(response.content(), "I have left the vc");
    assert!(!harness.registry.contains(guild(1)));
    assert_eq!(
        harness.node.calls(guild(1)).last(),
        Some(&Call::Disconnect)
    );

    let response = harness.manager.skip(guild(1)).await;
    assert_eq!(response.content(), "Not connected to any voice channel!");
}

#[tokio::test]
async fn leave_tears_down_when_disconnect_fails() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.node.fail("disconnect");

    let response = harness.manager.leave(guild(1)).await;

    assert_eq!(response.content(), "Error\ninjected failure");
    assert!(!harness.registry.contains(guild(1)));
}

#[tokio::test]
async fn queue_lists_the_tracks() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(1), "songB").await;
    harness.play(guild(1), "songC").await;
    harness.manager.pause(guild(1)).await;

    let response = harness.manager.queue(guild(1)).await;
    let embed = response.embed.expect("queue embed");

    assert_eq!(embed.title.as_deref(), Some("Queue"));
    assert_eq!(embed.fields.len(), 3);
    assert_eq!(embed.fields[0].name, "**Currently playing**");
    assert!(embed.fields[0].value.ends_with("(paused)"));
    assert_eq!(embed.fields[1].name, "1");
    assert!(embed.fields[1].value.contains("songB"));
    assert_eq!(embed.fields[2].name, "2");
    assert!(embed.fields[2].value.contains("songC"));
}

#[tokio::test]
async fn length_and_position() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.node.set_position(Duration::from_secs(83));

    let response = harness.manager.length(guild(1)).await;
    assert_eq!(response.content(), "Duration: 00:03:00");

    let response = harness.manager.position(guild(1)).await;
    assert_eq!(response.content(), "Current track position: **00:01:23**/00:03:00");
    assert!(response.ephemeral);
}

#[tokio::test]
async fn guilds_are_independent() {
    let harness = Harness::new();
    harness.play(guild(1), "songA").await;
    harness.play(guild(2), "songB").await;

    harness.manager.stop(guild(1)).await;

    assert_eq!(harness.status(guild(1)).await, Status::Idle);
    assert_eq!(harness.current(guild(2)).await.as_deref(), Some("songB"));
}
