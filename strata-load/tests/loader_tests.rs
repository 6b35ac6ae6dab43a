//! End-to-end loader passes: live population, cross-product expansion,
//! capture and replay, and release-on-fault.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use strata_cache::{InMemoryMemberCache, MemberCache};
use strata_core::{Datum, Hierarchy, Level, LoadError, Member};
use strata_load::{
    DefaultClassifier, InMemoryRowSource, MemberTarget, ResultLoader, SqlStatement, Target,
};

fn level(hierarchy: &str, name: &str, depth: u32) -> Arc<Level> {
    let dimension = hierarchy.trim_start_matches('[');
    let dimension = dimension.split(']').next().unwrap_or(dimension);
    let h = Arc::new(Hierarchy::new(hierarchy, dimension));
    Arc::new(Level::new(format!("{}.[{}]", hierarchy, name), depth, h))
}

fn candidates(level: &Arc<Level>, count: usize) -> Vec<Arc<Member>> {
    (0..count)
        .map(|i| {
            Arc::new(Member::new(
                format!("{}.[M{}]", level.unique_name, i),
                Datum::from(i as i64),
                None,
                level.clone(),
            ))
        })
        .collect()
}

fn store_rows() -> Vec<Vec<Datum>> {
    vec![
        vec![Datum::from(1i64), Datum::from("USA")],
        vec![Datum::from(2i64), Datum::from("Mexico")],
        vec![Datum::from(3i64), Datum::from("Canada")],
    ]
}

async fn executed(rows: Vec<Vec<Datum>>) -> SqlStatement {
    let mut stmt = SqlStatement::new(
        Box::new(InMemoryRowSource::new(rows)),
        Arc::new(DefaultClassifier),
        "populating member cache for [[Store].[Stores]]",
    );
    assert!(stmt.execute().await.unwrap());
    stmt
}

async fn drain(loader: &mut ResultLoader) {
    while loader.load_result().await.unwrap() {}
}

#[tokio::test]
async fn test_live_pass_without_enumerated_targets() {
    let cache: Arc<dyn MemberCache> = Arc::new(InMemoryMemberCache::with_defaults());
    let store = level("[Store].[Stores]", "Country", 1);
    let time = level("[Time].[Calendar]", "Year", 1);

    let rows = vec![
        vec![
            Datum::from(1i64),
            Datum::from("USA"),
            Datum::from(1997i64),
            Datum::from("1997"),
        ],
        vec![
            Datum::from(2i64),
            Datum::from("Mexico"),
            Datum::from(1998i64),
            Datum::from("1998"),
        ],
    ];
    let stmt = executed(rows).await;

    let targets: Vec<Box<dyn Target>> = vec![
        Box::new(MemberTarget::sql_driven(store, cache.clone())),
        Box::new(MemberTarget::sql_driven(time, cache.clone())),
    ];
    let mut loader = ResultLoader::new(targets, 0, Some(stmt), None, false).unwrap();
    drain(&mut loader).await;

    let targets = loader.into_targets();
    assert_eq!(targets[0].registered().len(), 2);
    assert_eq!(targets[1].registered().len(), 2);
    assert_eq!(
        targets[0].registered()[1].unique_name,
        "[Store].[Stores].[Mexico]"
    );
    assert_eq!(
        targets[1].registered()[0].unique_name,
        "[Time].[Calendar].[1997]"
    );
}

#[tokio::test]
async fn test_cross_product_expansion_and_capture() {
    let cache: Arc<dyn MemberCache> = Arc::new(InMemoryMemberCache::with_defaults());
    let store = level("[Store].[Stores]", "Country", 1);
    let gender = level("[Gender].[Gender]", "Gender", 1);
    let media = level("[Media].[Media]", "Media Type", 1);

    let stmt = executed(store_rows()).await;
    let targets: Vec<Box<dyn Target>> = vec![
        Box::new(MemberTarget::sql_driven(store, cache.clone())),
        Box::new(MemberTarget::enumerated(
            gender.clone(),
            cache.clone(),
            candidates(&gender, 2),
        )),
        Box::new(MemberTarget::enumerated(
            media.clone(),
            cache.clone(),
            candidates(&media, 4),
        )),
    ];

    let mut loader = ResultLoader::new(targets, 2, Some(stmt), None, true).unwrap();
    drain(&mut loader).await;

    let capture = loader.take_capture().unwrap();
    let targets = loader.into_targets();

    // 3 native rows x 2 x 4 enumerated candidates.
    for target in &targets {
        assert_eq!(target.registered().len(), 24);
    }
    // Within one native row the SQL-driven member is the same Arc for all
    // eight combinations.
    let store_members = targets[0].registered();
    assert!(Arc::ptr_eq(&store_members[0], &store_members[7]));
    assert!(!Arc::ptr_eq(&store_members[7], &store_members[8]));

    // One captured row per native row, holding only the SQL-driven member.
    assert_eq!(capture.len(), 3);
    assert_eq!(capture[0].len(), 1);
    assert_eq!(capture[0][0].unique_name, "[Store].[Stores].[USA]");
    assert_eq!(capture[2][0].unique_name, "[Store].[Stores].[Canada]");
}

#[tokio::test]
async fn test_replay_registers_the_same_combinations() {
    let cache: Arc<dyn MemberCache> = Arc::new(InMemoryMemberCache::with_defaults());
    let store = level("[Store].[Stores]", "Country", 1);
    let gender = level("[Gender].[Gender]", "Gender", 1);
    let gender_candidates = candidates(&gender, 2);

    let stmt = executed(store_rows()).await;
    let live_targets: Vec<Box<dyn Target>> = vec![
        Box::new(MemberTarget::sql_driven(store.clone(), cache.clone())),
        Box::new(MemberTarget::enumerated(
            gender.clone(),
            cache.clone(),
            gender_candidates.clone(),
        )),
    ];
    let mut live = ResultLoader::new(live_targets, 1, Some(stmt), None, true).unwrap();
    drain(&mut live).await;
    let capture = live.take_capture().unwrap();
    let live_targets = live.into_targets();

    let replay_targets: Vec<Box<dyn Target>> = vec![
        Box::new(MemberTarget::sql_driven(store, cache.clone())),
        Box::new(MemberTarget::enumerated(gender, cache, gender_candidates)),
    ];
    let mut replay = ResultLoader::new(replay_targets, 1, None, Some(capture), false).unwrap();
    drain(&mut replay).await;
    let replay_targets = replay.into_targets();

    for (live_target, replay_target) in live_targets.iter().zip(&replay_targets) {
        let live_names: Vec<_> = live_target
            .registered()
            .iter()
            .map(|m| m.unique_name.clone())
            .collect();
        let replay_names: Vec<_> = replay_target
            .registered()
            .iter()
            .map(|m| m.unique_name.clone())
            .collect();
        assert_eq!(live_names, replay_names);
    }
    // The replayed SQL-driven members are the very Arcs captured earlier.
    assert!(Arc::ptr_eq(
        &live_targets[0].registered()[0],
        &replay_targets[0].registered()[0]
    ));
}

#[tokio::test]
async fn test_fault_mid_pass_wraps_once_and_releases_statement() {
    let cache: Arc<dyn MemberCache> = Arc::new(InMemoryMemberCache::with_defaults());
    let store = level("[Store].[Stores]", "Country", 1);

    let source = InMemoryRowSource::new(store_rows()).with_fail_on_advance(1);
    let closes = source.close_counter();
    let mut stmt = SqlStatement::new(
        Box::new(source),
        Arc::new(DefaultClassifier),
        "populating member cache for [[Store].[Stores]]",
    );
    assert!(stmt.execute().await.unwrap());

    let targets: Vec<Box<dyn Target>> =
        vec![Box::new(MemberTarget::sql_driven(store, cache))];
    let mut loader = ResultLoader::new(targets, 0, Some(stmt), None, false).unwrap();

    // Row 0 processes, the advance onto row 1 faults.
    let fault = loader.load_result().await.unwrap_err();
    match fault {
        LoadError::RowSource {
            context, reason, ..
        } => {
            assert!(context.contains("[[Store].[Stores]]"));
            assert!(reason.contains("injected fault"));
        }
        other => panic!("expected wrapped row source fault, got {:?}", other),
    }

    drop(loader);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_replay_of_empty_capture_is_exhausted() {
    let cache: Arc<dyn MemberCache> = Arc::new(InMemoryMemberCache::with_defaults());
    let store = level("[Store].[Stores]", "Country", 1);
    let targets: Vec<Box<dyn Target>> =
        vec![Box::new(MemberTarget::sql_driven(store, cache))];

    let mut loader = ResultLoader::new(targets, 0, None, Some(Vec::new()), false).unwrap();
    let fault = loader.load_result().await.unwrap_err();
    assert!(matches!(fault, LoadError::RowSource { .. }));
}
