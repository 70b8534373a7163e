#[path = "../support/mod.rs"]
mod support;

use kindle_bridge::config::ScanSettings;
use kindle_bridge::notebook::{KindleHtmlParser, MarkdownRenderer};
use kindle_bridge::pipeline::{MailIngestionPipeline, MessageOutcome, NoteInbox};
use std::sync::Arc;
use support::{kindle_export, mail_message, FakeChat, FakeMailbox, FakeTransport};

fn settings() -> ScanSettings {
    ScanSettings {
        owner: "inbox@example.com".to_string(),
        trusted_sender: "Reader@Example.com".to_string(),
        owner_chat_id: "1001".to_string(),
        processed_label: "ProcessedByKindleBot".to_string(),
    }
}

fn pipeline(
    mailbox: Arc<FakeMailbox>,
    chat: Arc<FakeChat>,
    notes: Option<Arc<FakeTransport>>,
) -> MailIngestionPipeline {
    MailIngestionPipeline::new(
        mailbox,
        Arc::new(KindleHtmlParser),
        Arc::new(MarkdownRenderer),
        chat,
        notes.map(|transport| NoteInbox {
            transport,
            to: "notes@example.com".to_string(),
            from: "bot@example.com".to_string(),
        }),
        settings(),
    )
}

#[tokio::test]
async fn test_empty_mailbox_makes_no_calls() {
    let mailbox = Arc::new(FakeMailbox::default());
    let chat = Arc::new(FakeChat::default());
    let report = pipeline(mailbox.clone(), chat.clone(), None)
        .run("scan-1")
        .await
        .unwrap();

    assert_eq!((report.processed, report.skipped, report.failed), (0, 0, 0));
    assert_eq!(*mailbox.label_lookups.lock().unwrap(), 0);
    assert!(chat.documents().is_empty());
}

#[tokio::test]
async fn test_trusted_message_delivered_and_labeled_once() {
    let html = kindle_export("Dune");
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![mail_message(
        "m1",
        "READER@example.com",
        &[("notebook.html", &html)],
    )]));
    let chat = Arc::new(FakeChat::default());
    let notes = Arc::new(FakeTransport::default());
    let pipeline = pipeline(mailbox.clone(), chat.clone(), Some(notes.clone()));

    let report = pipeline.run("scan-1").await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(mailbox.labeled(), vec!["m1".to_string()]);

    let docs = chat.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].chat_id, "1001");
    assert_eq!(docs[0].filename, "Dune.md");
    assert_eq!(docs[0].content_type, "text/markdown");
    assert_eq!(docs[0].caption.as_deref(), Some("Kindle notes: Dune"));
    assert!(docs[0].content.starts_with("# Dune\n"));
    assert!(docs[0].content.contains("> Fear is the mind-killer."));

    let sent = notes.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "notes@example.com");
    assert_eq!(sent[0].subject, "Dune — Kindle notes");
    assert_eq!(sent[0].attachments[0].filename, "Dune.md");

    // Second scan sees nothing new.
    let again = pipeline.run("scan-2").await.unwrap();
    assert_eq!((again.processed, again.skipped), (0, 0));
    assert_eq!(chat.documents().len(), 1);
    assert_eq!(mailbox.labeled().len(), 1);
}

#[tokio::test]
async fn test_untrusted_sender_skipped_and_not_labeled() {
    let html = kindle_export("Dune");
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![mail_message(
        "m1",
        "stranger@example.com",
        &[("notebook.html", &html)],
    )]));
    let chat = Arc::new(FakeChat::default());
    let pipeline = pipeline(mailbox.clone(), chat.clone(), None);

    let report = pipeline.run("scan-1").await.unwrap();
    assert_eq!((report.processed, report.skipped), (0, 1));
    assert!(mailbox.labeled().is_empty());
    assert!(chat.documents().is_empty());

    // Still visible next time.
    let again = pipeline.run("scan-2").await.unwrap();
    assert_eq!(again.skipped, 1);
}

#[tokio::test]
async fn test_no_note_inbox_means_chat_only() {
    let html = kindle_export("Dune");
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![mail_message(
        "m1",
        "reader@example.com",
        &[("notebook.html", &html)],
    )]));
    let chat = Arc::new(FakeChat::default());
    let report = pipeline(mailbox, chat.clone(), None).run("scan-1").await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(chat.documents().len(), 1);
}

#[tokio::test]
async fn test_untitled_export_named_after_attachment() {
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![mail_message(
        "m1",
        "reader@example.com",
        &[("export.HTML", "<html><body><p>nothing here</p></body></html>")],
    )]));
    let chat = Arc::new(FakeChat::default());
    pipeline(mailbox, chat.clone(), None).run("scan-1").await.unwrap();

    let docs = chat.documents();
    assert_eq!(docs[0].filename, "export.md");
    assert_eq!(docs[0].caption.as_deref(), Some("Kindle notes: "));
}

#[tokio::test]
async fn test_attachments_delivered_in_arrival_order() {
    let first = kindle_export("Alpha");
    let second = kindle_export("Beta");
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![mail_message(
        "m1",
        "reader@example.com",
        &[("a.html", &first), ("b.html", &second)],
    )]));
    let chat = Arc::new(FakeChat::default());
    let report = pipeline(mailbox.clone(), chat.clone(), None)
        .run("scan-1")
        .await
        .unwrap();

    let names: Vec<String> = chat.documents().into_iter().map(|d| d.filename).collect();
    assert_eq!(names, vec!["Alpha.md", "Beta.md"]);
    assert_eq!(
        report.outcomes[0].1,
        MessageOutcome::Delivered { attachments: 2 }
    );
    assert_eq!(mailbox.labeled().len(), 1);
}

#[tokio::test]
async fn test_failed_message_does_not_block_others() {
    let bad = kindle_export("Broken");
    let good = kindle_export("Dune");
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![
        mail_message("m1", "reader@example.com", &[("x.html", &bad)]),
        mail_message("m2", "reader@example.com", &[("y.html", &good)]),
    ]));
    let chat = Arc::new(FakeChat {
        fail_documents_named: Some("Broken".to_string()),
        ..FakeChat::default()
    });
    let report = pipeline(mailbox.clone(), chat.clone(), None)
        .run("scan-1")
        .await
        .unwrap();

    assert_eq!((report.processed, report.failed), (1, 1));
    assert!(matches!(report.outcomes[0].1, MessageOutcome::Failed { .. }));
    assert_eq!(mailbox.labeled(), vec!["m2".to_string()]);
}

#[tokio::test]
async fn test_note_inbox_failure_leaves_message_unlabeled() {
    let html = kindle_export("Dune");
    let mailbox = Arc::new(FakeMailbox::with_messages(vec![mail_message(
        "m1",
        "reader@example.com",
        &[("notebook.html", &html)],
    )]));
    let chat = Arc::new(FakeChat::default());
    let notes = Arc::new(FakeTransport::failing());
    let report = pipeline(mailbox.clone(), chat, Some(notes))
        .run("scan-1")
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(mailbox.labeled().is_empty());
}

#[tokio::test]
async fn test_listing_failure_aborts_scan() {
    let mailbox = Arc::new(FakeMailbox {
        fail_listing: true,
        ..FakeMailbox::default()
    });
    let chat = Arc::new(FakeChat::default());
    let result = pipeline(mailbox, chat, None).run("scan-1").await;
    assert!(result.is_err());
}
