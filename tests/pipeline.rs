use itemtrack::bbox::BBox;
use itemtrack::{
    ClassifierError, DomainCategory, DomainPack, Frame, GateConfig, ItemId, LabelCandidate,
    ManualClock, RawDetection, Session, SessionConfig, Thumbnail,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const FRAME_MS: u64 = 33;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pack() -> Arc<DomainPack> {
    let pack = DomainPack::new(
        "home_resale",
        vec![
            DomainCategory::new("furniture", "Furniture", ["table", "chair"], 2),
            DomainCategory::new("drinkware", "Drinkware", ["mug", "cup"], 10),
        ],
    )
    .with_context_stoplist(["table", "room"]);

    Arc::new(pack.validated().unwrap())
}

fn mug_frame(tracking_id: i64, confidence: f32, crop: &[u8]) -> Frame {
    Frame::new(vec![RawDetection::new(
        tracking_id,
        BBox::ltrb(0.3, 0.3, 0.6, 0.7),
        vec![LabelCandidate::new("cup", confidence)],
    )
    .with_thumbnail(crop)])
}

struct Harness {
    clock: Arc<ManualClock>,
    calls: Arc<AtomicUsize>,
    cloud: Arc<AtomicBool>,
    session: Session,
}

fn harness(cooldown_ms: u64, fail: bool) -> Harness {
    init_tracing();

    let clock = Arc::new(ManualClock::new(1_000_000));
    let calls = Arc::new(AtomicUsize::new(0));
    let cloud = Arc::new(AtomicBool::new(true));

    let counter = calls.clone();
    let classifier = move |_: &Thumbnail| -> Result<Vec<LabelCandidate>, ClassifierError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if fail {
            return Err(ClassifierError::Unavailable("offline".into()));
        }
        Ok(vec![
            LabelCandidate::new("wooden table", 0.95),
            LabelCandidate::new("coffee mug", 0.65),
        ])
    };

    let config = SessionConfig {
        gate: GateConfig::default().with_cooldown_ms(cooldown_ms),
        ..SessionConfig::default()
    };

    let flag = cloud.clone();
    let session = Session::new(
        config,
        pack(),
        clock.clone(),
        Arc::new(move || flag.load(Ordering::SeqCst)),
        Arc::new(classifier),
    )
    .unwrap();

    Harness {
        clock,
        calls,
        cloud,
        session,
    }
}

impl Harness {
    fn frame(&mut self, frame: &Frame) -> itemtrack::FrameReport {
        let report = self.session.process_frame(frame).unwrap();
        self.clock.advance(FRAME_MS);
        report
    }
}

#[test]
fn stable_item_is_classified_exactly_once() {
    let mut h = harness(0, false);
    let crop = [7u8, 7, 7, 7];

    let mut dispatched = Vec::new();
    let mut categorized = Vec::new();
    for (n, conf) in [0.40, 0.45, 0.50, 0.55, 0.60, 0.65].into_iter().enumerate() {
        let report = h.frame(&mug_frame(11, conf, &crop));
        assert_eq!(report.touched, vec![ItemId(1)]);

        if !report.dispatched.is_empty() {
            dispatched.push(n + 1);
        }
        categorized.extend(report.categorized);
    }

    // stable at the fifth frame, sixth frame carries the same crop
    assert_eq!(dispatched, vec![5]);

    categorized.extend(h.session.wait_idle().unwrap());
    assert_eq!(categorized, vec![ItemId(1)]);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);

    let item = h.session.item(ItemId(1)).unwrap();
    assert_eq!(item.merge_count(), 6);
    assert_eq!(item.category(), Some("drinkware"));
    assert_eq!(item.label_text(), Some("Drinkware"));
    assert!((item.domain().unwrap().confidence - 0.65).abs() < 1e-3);
    assert!((item.average_confidence() - 0.525).abs() < 1e-5);
    assert_eq!(item.max_confidence(), 0.65);

    for _ in 0..5 {
        let report = h.frame(&mug_frame(11, 0.7, &crop));
        assert!(report.dispatched.is_empty());
    }
    assert!(h.session.wait_idle().unwrap().is_empty());
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);

    // new content is worth another look
    let report = h.frame(&mug_frame(11, 0.7, &[8u8, 8, 8]));
    assert_eq!(report.dispatched, vec![ItemId(1)]);
    h.session.wait_idle().unwrap();
    assert_eq!(h.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn cooldown_holds_back_new_content() {
    let mut h = harness(10_000, false);

    for i in 0..5u8 {
        h.frame(&mug_frame(3, 0.5, &[i]));
    }
    assert_eq!(h.session.in_flight(), 1);

    for i in 10..20u8 {
        let report = h.frame(&mug_frame(3, 0.5, &[i]));
        assert!(report.dispatched.is_empty());
    }

    h.clock.advance(10_000);
    let report = h.frame(&mug_frame(3, 0.5, &[99]));
    assert_eq!(report.dispatched, vec![ItemId(1)]);
}

#[test]
fn tracker_id_switch_does_not_duplicate_item() {
    let mut h = harness(0, false);

    for _ in 0..3 {
        h.frame(&mug_frame(1, 0.5, &[1]));
    }
    // detector lost the object and picked it up under a new id
    for _ in 0..3 {
        h.frame(&mug_frame(2, 0.5, &[1]));
    }

    let items: Vec<_> = h.session.items().collect();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].merge_count(), 6);
    assert_eq!(items[0].tracking_id(), 2);
}

#[test]
fn result_for_evicted_item_is_dropped() {
    let mut h = harness(0, false);

    for i in 0..5u8 {
        h.frame(&mug_frame(5, 0.5, &[i]));
    }
    assert_eq!(h.session.in_flight(), 1);

    let evicted = h.session.evict(ItemId(1)).unwrap();
    assert_eq!(evicted.merge_count(), 5);
    assert_eq!(h.session.gate().attempts(), 0);

    assert!(h.session.wait_idle().unwrap().is_empty());
    assert!(h.session.item(ItemId(1)).is_none());

    // same physical object comes back as a fresh, unclassified item
    let report = h.frame(&mug_frame(5, 0.5, &[42]));
    assert_eq!(report.touched, vec![ItemId(2)]);
    assert!(h.session.item(ItemId(2)).unwrap().domain().is_none());
}

#[test]
fn cloud_disabled_never_dispatches() {
    let mut h = harness(0, false);
    h.cloud.store(false, Ordering::SeqCst);

    for i in 0..10u8 {
        let report = h.frame(&mug_frame(8, 0.9, &[i]));
        assert!(report.dispatched.is_empty());
    }
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);

    h.cloud.store(true, Ordering::SeqCst);
    let report = h.frame(&mug_frame(8, 0.9, &[77]));
    assert_eq!(report.dispatched, vec![ItemId(1)]);
}

#[test]
fn classifier_failure_leaves_item_uncategorized() {
    let mut h = harness(0, true);

    for i in 0..5u8 {
        h.frame(&mug_frame(9, 0.5, &[i]));
    }

    assert!(h.session.wait_idle().unwrap().is_empty());
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);

    let item = h.session.item(ItemId(1)).unwrap();
    assert!(item.domain().is_none());
    assert_eq!(item.category(), Some("cup"));
}

#[test]
fn results_are_applied_on_a_later_frame() {
    let mut h = harness(0, false);

    for i in 0..5u8 {
        h.frame(&mug_frame(6, 0.5, &[i]));
    }

    // wait for the worker without applying, then let the next frame pick it up
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while h.calls.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        std::thread::yield_now();
    }

    // same crop as the one submitted, so nothing new gets dispatched meanwhile
    let mut categorized = Vec::new();
    while categorized.is_empty() && std::time::Instant::now() < deadline {
        let report = h.frame(&mug_frame(6, 0.5, &[4]));
        assert!(report.dispatched.is_empty());
        categorized = report.categorized;
    }

    assert_eq!(categorized, vec![ItemId(1)]);
    assert_eq!(h.session.item(ItemId(1)).unwrap().category(), Some("drinkware"));
}
