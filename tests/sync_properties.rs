mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{span_item, RecordingMetrics, ScriptedProvider, SAMPLE};
use proofline::{
    Category, Channel, Decoration, DictionaryProvider, Edit, EditorSurface, EngineError,
    InMemoryRepository, RecordingSurface, Session, StructuralRange, Suggestion,
    SuggestionRepository, SurfaceError, TextRange,
};
use serde_json::json;

async fn open_with_dictionary(text: &str, repo: Arc<InMemoryRepository>) -> Session {
    Session::builder("doc", 1)
        .provider(Channel::Spelling, Arc::new(DictionaryProvider::spelling()))
        .repository(repo)
        .open(text)
        .await
        .expect("session opens")
}

fn by_original<'a>(suggestions: &'a [Suggestion], original: &str) -> &'a Suggestion {
    suggestions
        .iter()
        .find(|s| s.original_text.as_deref() == Some(original))
        .unwrap_or_else(|| panic!("no suggestion for {original}"))
}

#[tokio::test(start_paused = true)]
async fn accepting_in_either_order_gives_the_same_text() {
    let expected = "Test with misspelled words and bad grammar.";

    for grammar_first in [false, true] {
        let session = open_with_dictionary(SAMPLE, Arc::new(InMemoryRepository::new())).await;
        let found = session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();
        assert_eq!(found.len(), 2);
        let misspeled = by_original(&found, "misspeled").clone();
        let grammer = by_original(&found, "grammer").clone();
        assert_eq!(misspeled.range, TextRange::new(10, 19).unwrap());
        assert_eq!(grammer.range, TextRange::new(34, 41).unwrap());

        let (first, second) = if grammar_first {
            (grammer, misspeled)
        } else {
            (misspeled, grammer)
        };
        session.accept_suggestion(&first.id, None).await.unwrap();
        let outcome = session.accept_suggestion(&second.id, None).await.unwrap();
        assert_eq!(outcome.new_text, expected);
        assert!(outcome.suggestions.is_empty());
        assert_eq!(session.text(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn accept_shifts_later_suggestions() {
    let session = open_with_dictionary(SAMPLE, Arc::new(InMemoryRepository::new())).await;
    let found = session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();
    let misspeled = by_original(&found, "misspeled").clone();

    let outcome = session.accept_suggestion(&misspeled.id, None).await.unwrap();
    assert_eq!(outcome.cursor, 20);
    assert_eq!(outcome.structural, StructuralRange { from: 11, to: 20 });
    assert_eq!(outcome.suggestions.len(), 1);
    assert_eq!(outcome.suggestions[0].range, TextRange::new(35, 42).unwrap());
}

#[tokio::test(start_paused = true)]
async fn reconcile_twice_is_idempotent() {
    let session = open_with_dictionary(SAMPLE, Arc::new(InMemoryRepository::new())).await;
    session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();

    let first = session.reconcile().await.unwrap();
    let after_first = session.suggestions();
    let second = session.reconcile().await.unwrap();
    let after_second = session.suggestions();

    assert!(first.is_empty());
    assert!(second.is_empty());
    assert_eq!(after_first, after_second);
}

#[tokio::test(start_paused = true)]
async fn edits_before_a_suggestion_shift_it() {
    let session = open_with_dictionary(SAMPLE, Arc::new(InMemoryRepository::new())).await;
    session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();

    session.on_edit(Edit::insert(0, "Well, ")).await.unwrap();
    let live = session.get_active_suggestions("doc", 1);
    assert_eq!(live.len(), 2);
    assert_eq!(by_original(&live, "misspeled").range, TextRange::new(16, 25).unwrap());

    let decorations: Vec<Decoration> = session.decorations();
    assert_eq!(decorations[0].start, 17);
    assert_eq!(decorations[0].end, 26);
}

#[tokio::test(start_paused = true)]
async fn edits_inside_a_suggestion_invalidate_it() {
    let session = open_with_dictionary(SAMPLE, Arc::new(InMemoryRepository::new())).await;
    session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();

    // "misspeled" -> "mispeled"
    session.on_edit(Edit::delete(13, 14)).await.unwrap();
    let live = session.get_active_suggestions("doc", 1);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].original_text.as_deref(), Some("grammer"));
}

#[tokio::test(start_paused = true)]
async fn dismissed_content_stays_dismissed() {
    let text = "I think teh answer is here.";
    let repo = Arc::new(InMemoryRepository::new());
    let session = open_with_dictionary(text, repo.clone()).await;

    let found = session.run_check(Channel::Spelling, text, "doc").await.unwrap();
    assert_eq!(found.len(), 1);
    session.dismiss_suggestion(&found[0].id).await.unwrap();
    assert!(session.suggestions().is_empty());

    // Past the explicit-check cool-down: the provider runs again and finds
    // "teh" again under a fresh id.
    tokio::time::advance(Duration::from_secs(2)).await;
    let rerun = session.run_check(Channel::Spelling, text, "doc").await.unwrap();
    assert!(rerun.is_empty());

    assert_eq!(repo.list_dismissals("doc").await.unwrap().len(), 1);

    // A fresh session on the same store remembers the dismissal.
    session.close();
    let reopened = open_with_dictionary(text, repo.clone()).await;
    let again = reopened.run_check(Channel::Spelling, text, "doc").await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dismissal_is_tied_to_surrounding_context() {
    let text = "I think teh answer is here.";
    let session = open_with_dictionary(text, Arc::new(InMemoryRepository::new())).await;
    let found = session.run_check(Channel::Spelling, text, "doc").await.unwrap();
    session.dismiss_suggestion(&found[0].id).await.unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    let moved = "Yesterday you said teh answer is here.";
    let rerun = session.run_check(Channel::Spelling, moved, "doc").await.unwrap();
    assert_eq!(rerun.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn accept_invalidates_overlapping_suggestions() {
    let session = open_with_dictionary(SAMPLE, Arc::new(InMemoryRepository::new())).await;
    let found = session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();
    let grammer = by_original(&found, "grammer").clone();

    let style = Suggestion::new("doc", 1, Channel::Style, Category::Style, TextRange::new(30, 41).unwrap())
        .with_original("bad grammer")
        .with_suggestion("poor grammar");
    let style_id = session.add_suggestion(style).await.unwrap();
    assert_eq!(session.suggestions().len(), 3);

    session.accept_suggestion(&grammer.id, None).await.unwrap();
    let live = session.get_active_suggestions("doc", 1);
    assert!(live.iter().all(|s| s.id != style_id));
    assert!(session.suggestion(&style_id).is_some());

    tokio::time::advance(Duration::from_millis(1600)).await;
    let report = session.reconcile().await.unwrap();
    assert_eq!(report.purged.len(), 1);
    assert!(session.suggestion(&style_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn one_malformed_item_does_not_sink_the_batch() {
    let text = "alpha bravo charlie delta echo foxtrot golf hotel india juliet";
    let words = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india"];
    let mut items: Vec<_> = words
        .iter()
        .map(|word| span_item(text, word, &word.to_uppercase()))
        .collect();
    items.insert(4, json!({"start": 7, "end": 7, "original": ""}));

    let provider = Arc::new(ScriptedProvider::new("scripted").then_ok(Duration::ZERO, items));
    let metrics = RecordingMetrics::new();
    let session = Session::builder("doc", 1)
        .provider(Channel::Spelling, provider.clone())
        .metrics(metrics.clone())
        .open(text)
        .await
        .unwrap();

    let found = session.run_check(Channel::Spelling, text, "doc").await.unwrap();
    assert_eq!(found.len(), 9);
    assert_eq!(metrics.count("skipped:spelling:1"), 1);
    assert_eq!(metrics.count("check_ok:spelling:9"), 1);
}

#[tokio::test(start_paused = true)]
async fn create_accept_dismiss_round_trip() {
    let text = "alpha bravo charlie delta echo";
    let repo = Arc::new(InMemoryRepository::new());
    let session = Session::builder("doc", 1)
        .repository(repo.clone())
        .open(text)
        .await
        .unwrap();

    let mut ids = Vec::new();
    for word in ["alpha", "bravo", "charlie", "delta", "echo"] {
        let start = text.find(word).unwrap();
        let suggestion = Suggestion::new(
            "doc",
            1,
            Channel::Spelling,
            Category::Spelling,
            TextRange::new(start, start + word.len()).unwrap(),
        )
        .with_original(word)
        .with_suggestion(word.to_uppercase());
        ids.push(session.add_suggestion(suggestion).await.unwrap());
    }
    assert_eq!(session.get_active_suggestions("doc", 1).len(), 5);

    session.accept_suggestion(&ids[0], None).await.unwrap();
    session.dismiss_suggestion(&ids[1]).await.unwrap();

    assert_eq!(session.get_active_suggestions("doc", 1).len(), 3);
    assert_eq!(repo.list_active("doc", 1).await.unwrap().len(), 3);
    assert!(session.get_active_suggestions("doc", 2).is_empty());
    assert!(session.get_active_suggestions("other", 1).is_empty());
    assert_eq!(session.text(), "ALPHA bravo charlie delta echo");
}

#[tokio::test(start_paused = true)]
async fn empty_ranges_are_rejected_at_ingestion() {
    let session = Session::builder("doc", 1).open("some text").await.unwrap();
    assert!(TextRange::new(5, 5).is_err());

    let empty = Suggestion::new("doc", 1, Channel::Spelling, Category::Spelling, TextRange { start: 5, end: 5 });
    let err = session.add_suggestion(empty).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSuggestion { .. }));
    assert!(session.suggestions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn accept_reports_missing_and_unusable_suggestions() {
    let text = "alpha bravo";
    let session = Session::builder("doc", 1).open(text).await.unwrap();
    let bare = Suggestion::new("doc", 1, Channel::Style, Category::Style, TextRange::new(0, 5).unwrap())
        .with_original("alpha");
    let id = session.add_suggestion(bare).await.unwrap();

    let missing = session.accept_suggestion(&"nope".into(), None).await.unwrap_err();
    assert_eq!(missing, EngineError::NotFound("nope".into()));

    let no_replacement = session.accept_suggestion(&id, None).await.unwrap_err();
    assert!(matches!(no_replacement, EngineError::InvalidSuggestion { .. }));

    let outcome = session.accept_suggestion(&id, Some("omega")).await.unwrap();
    assert_eq!(outcome.new_text, "omega bravo");
}

#[tokio::test(start_paused = true)]
async fn surface_rejection_changes_nothing() {
    let surface = Arc::new(RecordingSurface::new());
    let session = Session::builder("doc", 1)
        .provider(Channel::Spelling, Arc::new(DictionaryProvider::spelling()))
        .surface(surface.clone())
        .open(SAMPLE)
        .await
        .unwrap();
    let found = session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();

    surface.reject_replacements("read-only");
    let err = session.accept_suggestion(&found[0].id, None).await.unwrap_err();
    assert_eq!(err, EngineError::Surface(SurfaceError::Rejected("read-only".into())));
    assert_eq!(session.text(), SAMPLE);
    assert_eq!(session.suggestions().len(), 2);

    surface.accept_replacements();
    session.accept_suggestion(&found[0].id, None).await.unwrap();
    assert_eq!(session.suggestions().len(), 1);
}

/// Surface whose replacements take a while to land.
struct SlowSurface;

#[async_trait]
impl EditorSurface for SlowSurface {
    async fn replace_range(&self, _range: StructuralRange, _text: &str) -> Result<(), SurfaceError> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    async fn restore_selection(&self, _position: usize) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn decorate(&self, _decorations: &[Decoration]) -> Result<(), SurfaceError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn second_accept_fails_fast_while_one_is_in_flight() {
    let session = Session::builder("doc", 1)
        .provider(Channel::Spelling, Arc::new(DictionaryProvider::spelling()))
        .surface(Arc::new(SlowSurface))
        .open(SAMPLE)
        .await
        .unwrap();
    let found = session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();
    let first = found[0].id.clone();
    let second = found[1].id.clone();

    let background = session.clone();
    let in_flight = tokio::spawn(async move { background.accept_suggestion(&first, None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        session.accept_suggestion(&second, None).await.unwrap_err(),
        EngineError::ApplyInProgress
    );
    assert!(session.reconcile().await.is_none());
    assert_eq!(
        session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap_err(),
        EngineError::ApplyInProgress
    );

    in_flight.await.unwrap().unwrap();
    session.accept_suggestion(&second, None).await.unwrap();
    assert_eq!(session.text(), "Test with misspelled words and bad grammar.");
}

async fn open_with_slow_surface(repo: Arc<InMemoryRepository>) -> Session {
    Session::builder("doc", 1)
        .provider(Channel::Spelling, Arc::new(DictionaryProvider::spelling()))
        .surface(Arc::new(SlowSurface))
        .repository(repo)
        .open(SAMPLE)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn dismiss_waits_out_an_accept_in_flight() {
    let repo = Arc::new(InMemoryRepository::new());
    let session = open_with_slow_surface(repo.clone()).await;
    let found = session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();
    let id = by_original(&found, "misspeled").id.clone();

    let background = session.clone();
    let target = id.clone();
    let in_flight = tokio::spawn(async move { background.accept_suggestion(&target, None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        session.dismiss_suggestion(&id).await.unwrap_err(),
        EngineError::ApplyInProgress
    );

    let outcome = in_flight.await.unwrap().unwrap();
    assert_eq!(outcome.new_text, "Test with misspelled words and bad grammer.");
    assert_eq!(
        session.dismiss_suggestion(&id).await.unwrap_err(),
        EngineError::NotFound(id.clone())
    );

    assert!(repo.list_dismissals("doc").await.unwrap().is_empty());
    let row = repo.all_rows().into_iter().find(|row| row.id == id).unwrap();
    assert!(row.flags.accepted);
    assert!(!row.flags.dismissed);
}

#[tokio::test(start_paused = true)]
async fn accept_that_loses_its_text_needs_a_full_sync() {
    let session = open_with_slow_surface(Arc::new(InMemoryRepository::new())).await;
    let found = session.run_check(Channel::Spelling, SAMPLE, "doc").await.unwrap();
    let grammer = by_original(&found, "grammer").id.clone();
    let misspeled = by_original(&found, "misspeled").id.clone();

    let background = session.clone();
    let in_flight = tokio::spawn(async move { background.accept_suggestion(&grammer, None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The user deletes the word while the editor is still replacing it.
    session.on_edit(Edit::delete(34, 41)).await.unwrap();
    let err = in_flight.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::SurfaceDiverged { .. }));
    assert!(session.needs_resync());
    assert!(session.is_idle());
    assert_eq!(session.text(), "Test with misspeled words and bad .");

    assert_eq!(
        session.on_edit(Edit::insert(0, "x")).await.unwrap_err(),
        EngineError::ResyncRequired
    );
    assert_eq!(
        session.accept_suggestion(&misspeled, None).await.unwrap_err(),
        EngineError::ResyncRequired
    );

    let editor_text = "Test with misspeled words and bad grammar.";
    session.sync_text(editor_text).await.unwrap();
    assert!(!session.needs_resync());
    assert_eq!(session.text(), editor_text);

    let live = session.get_active_suggestions("doc", 1);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, misspeled);
    let outcome = session.accept_suggestion(&misspeled, None).await.unwrap();
    assert_eq!(outcome.new_text, "Test with misspelled words and bad grammar.");
}
