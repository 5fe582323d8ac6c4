mod common;

use assettree_core::{
    CategoryId, CategoryOverride, ContainerId, ElementId, ModelId, NodeContext, NodeKey, TreeNode,
    VisibilityStatus,
};
use assettree_storage::Storage;
use assettree_visibility::{
    DefaultStatus, InMemorySurface, ModelProps, RenderingSurface, StatusFuture, StatusOverride,
    TreeError, TreeSession, VisibilityOverrides,
};
use common::{
    CountingStore, DatasetBuilder, FailingStore, init_tracing, scene, session_with, ungrouped,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use VisibilityStatus::{Disabled, Hidden, Partial, Visible};

fn model_node(id: i64) -> TreeNode {
    TreeNode::new(NodeKey::Model(ModelId(id)), format!("model {id}"))
}

fn category_node(id: i64, models: &[i64]) -> TreeNode {
    TreeNode::new(NodeKey::Categories(vec![CategoryId(id)]), format!("category {id}")).with_context(
        NodeContext {
            model_ids: models.iter().copied().map(ModelId).collect(),
            ..NodeContext::default()
        },
    )
}

fn element_node(id: i64, model: i64, category: i64) -> TreeNode {
    TreeNode::new(NodeKey::Element(ElementId(id)), format!("element {id}")).with_context(
        NodeContext {
            model_ids: vec![ModelId(model)],
            category_id: Some(CategoryId(category)),
            sub_model_id: None,
        },
    )
}

fn container_node(id: i64) -> TreeNode {
    TreeNode::new(NodeKey::Containers(vec![ContainerId(id)]), format!("container {id}"))
}

fn ids(values: &[i64]) -> HashSet<ElementId> {
    values.iter().copied().map(ElementId).collect()
}

/// Model M (10) displayed with Walls and Doors enabled.
fn displayed_surface() -> Arc<InMemorySurface> {
    Arc::new(
        InMemorySurface::new()
            .with_displayed_models([ModelId(10), ModelId(20), ModelId(30)])
            .with_enabled_categories([CategoryId(100), CategoryId(101), CategoryId(102)]),
    )
}

fn session(store: Arc<Storage>, surface: &Arc<InMemorySurface>) -> TreeSession {
    session_with(
        store,
        Arc::clone(surface),
        ungrouped(),
        VisibilityOverrides::default(),
    )
}

#[tokio::test]
async fn test_partial_category_and_model_from_element_overrides() -> anyhow::Result<()> {
    init_tracing();
    let surface = displayed_surface();
    surface.set_always_drawn(ids(&[1000]), false).await;
    surface.set_never_drawn(ids(&[1001])).await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    let walls = resolver.get_visibility_status(&category_node(100, &[10])).await?;
    let doors = resolver.get_visibility_status(&category_node(101, &[10])).await?;
    let model = resolver.get_visibility_status(&model_node(10)).await?;
    assert_eq!(walls, Partial);
    assert_eq!(doors, Visible);
    assert_eq!(model, Partial);
    assert_eq!(model, VisibilityStatus::aggregate([walls, doors]));

    assert_eq!(resolver.get_visibility_status(&element_node(1000, 10, 100)).await?, Visible);
    assert_eq!(resolver.get_visibility_status(&element_node(1001, 10, 100)).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&element_node(1003, 10, 100)).await?, Visible);
    assert_eq!(resolver.get_visibility_status(&container_node(2)).await?, Partial);
    assert_eq!(resolver.get_visibility_status(&container_node(4)).await?, Visible);
    Ok(())
}

#[tokio::test]
async fn test_status_is_stable_across_repeated_calls() -> anyhow::Result<()> {
    let surface = displayed_surface();
    surface.set_never_drawn(ids(&[1002])).await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    let first = resolver.get_visibility_status(&container_node(1)).await?;
    let second = resolver.get_visibility_status(&container_node(1)).await?;
    assert_eq!(first, Partial);
    assert_eq!(first, second);
    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Partial);
    assert_eq!(resolver.get_visibility_status(&category_node(101, &[10])).await?, Hidden);
    Ok(())
}

#[tokio::test]
async fn test_undisplayed_model_hides_everything_below() -> anyhow::Result<()> {
    let surface = Arc::new(
        InMemorySurface::new().with_enabled_categories([CategoryId(100), CategoryId(101)]),
    );
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&category_node(100, &[10])).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&element_node(1000, 10, 100)).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&container_node(1)).await?, Hidden);
    Ok(())
}

#[tokio::test]
async fn test_non_spatial_view_disables_models_and_ignores_changes() -> anyhow::Result<()> {
    let surface = Arc::new(
        InMemorySurface::new()
            .with_spatial(false)
            .with_displayed_models([ModelId(10)]),
    );
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Disabled);
    assert_eq!(resolver.get_visibility_status(&container_node(2)).await?, Disabled);

    resolver.change_visibility(&model_node(10), false).await?;
    assert!(surface.is_model_displayed(ModelId(10)).await);
    Ok(())
}

#[tokio::test]
async fn test_change_on_then_status_is_visible() -> anyhow::Result<()> {
    let nodes = [
        element_node(1002, 10, 101),
        element_node(1003, 10, 100),
        category_node(100, &[10]),
        model_node(10),
    ];
    let prior_states: [(&[i64], &[i64], bool, &[i64]); 4] = [
        (&[], &[], false, &[]),
        (&[1000], &[1001, 1002, 1003], false, &[10]),
        (&[2000], &[1003], true, &[10, 20]),
        (&[1001], &[], true, &[]),
    ];

    for node in &nodes {
        for (always, never, exclusive, displayed) in prior_states {
            let surface = Arc::new(
                InMemorySurface::new()
                    .with_displayed_models(displayed.iter().copied().map(ModelId))
                    .with_enabled_categories([CategoryId(100)]),
            );
            surface.set_always_drawn(ids(always), exclusive).await;
            surface.set_never_drawn(ids(never)).await;
            let session = session(scene()?, &surface);

            session.resolver().change_visibility(node, true).await?;
            let status = session.resolver().get_visibility_status(node).await?;
            assert_eq!(
                status, Visible,
                "{:?} after on with always={always:?} never={never:?} exclusive={exclusive}",
                node.key
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_element_on_in_hidden_model_keeps_siblings_hidden() -> anyhow::Result<()> {
    let surface = Arc::new(
        InMemorySurface::new().with_enabled_categories([CategoryId(100), CategoryId(101)]),
    );
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    resolver
        .change_visibility(&element_node(1002, 10, 101), true)
        .await?;

    assert!(surface.is_model_displayed(ModelId(10)).await);
    assert_eq!(
        surface.category_override(ModelId(10), CategoryId(100)).await,
        CategoryOverride::Hide
    );
    assert_eq!(surface.always_drawn().await, ids(&[1002]));
    assert_eq!(resolver.get_visibility_status(&element_node(1002, 10, 101)).await?, Visible);
    assert_eq!(resolver.get_visibility_status(&element_node(1000, 10, 100)).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&category_node(101, &[10])).await?, Visible);
    assert_eq!(resolver.get_visibility_status(&category_node(100, &[10])).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Partial);
    Ok(())
}

#[tokio::test]
async fn test_element_off_lists_element_only_when_category_shows_it() -> anyhow::Result<()> {
    let surface = Arc::new(
        InMemorySurface::new()
            .with_displayed_models([ModelId(10)])
            .with_enabled_categories([CategoryId(100)]),
    );
    surface.set_always_drawn(ids(&[1002]), false).await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    resolver
        .change_visibility(&element_node(1000, 10, 100), false)
        .await?;
    resolver
        .change_visibility(&element_node(1002, 10, 101), false)
        .await?;

    assert_eq!(surface.never_drawn().await, ids(&[1000]));
    assert!(surface.always_drawn().await.is_empty());
    assert_eq!(resolver.get_visibility_status(&element_node(1000, 10, 100)).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&element_node(1002, 10, 101)).await?, Hidden);
    Ok(())
}

#[tokio::test]
async fn test_category_off_then_on_restores_status() -> anyhow::Result<()> {
    let surface = displayed_surface();
    let session = session(scene()?, &surface);
    let resolver = session.resolver();
    let walls = category_node(100, &[10]);

    let before = resolver.get_visibility_status(&walls).await?;
    assert_eq!(before, Visible);

    resolver.change_visibility(&walls, false).await?;
    assert_eq!(resolver.get_visibility_status(&walls).await?, Hidden);
    assert_eq!(
        surface.category_override(ModelId(10), CategoryId(100)).await,
        CategoryOverride::Hide
    );

    resolver.change_visibility(&walls, true).await?;
    assert_eq!(resolver.get_visibility_status(&walls).await?, before);
    assert_eq!(
        surface.category_override(ModelId(10), CategoryId(100)).await,
        CategoryOverride::None
    );
    Ok(())
}

#[tokio::test]
async fn test_category_change_clears_only_in_scope_overrides() -> anyhow::Result<()> {
    let surface = displayed_surface();
    surface.set_always_drawn(ids(&[1003, 1002, 3000]), false).await;
    surface.set_never_drawn(ids(&[1000, 2000])).await;
    let session = session(scene()?, &surface);

    session
        .resolver()
        .change_visibility(&category_node(100, &[10]), false)
        .await?;

    assert_eq!(surface.always_drawn().await, ids(&[1002, 3000]));
    assert_eq!(surface.never_drawn().await, ids(&[2000]));
    Ok(())
}

#[tokio::test]
async fn test_category_on_in_hidden_model_reveals_only_that_category() -> anyhow::Result<()> {
    let surface = Arc::new(
        InMemorySurface::new().with_enabled_categories([CategoryId(100), CategoryId(101)]),
    );
    surface.set_always_drawn(ids(&[1002]), false).await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    resolver
        .change_visibility(&category_node(100, &[10]), true)
        .await?;

    assert!(surface.always_drawn().await.is_empty());
    assert_eq!(resolver.get_visibility_status(&category_node(100, &[10])).await?, Visible);
    assert_eq!(resolver.get_visibility_status(&category_node(101, &[10])).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Partial);
    Ok(())
}

#[tokio::test]
async fn test_merged_category_pairs_resolve_independently() -> anyhow::Result<()> {
    let surface = displayed_surface();
    let session = session(scene()?, &surface);
    let resolver = session.resolver();
    // Walls of M (100) and Walls of M2 (102) merged under one label.
    let merged = TreeNode::new(
        NodeKey::Categories(vec![CategoryId(100), CategoryId(102)]),
        "Walls",
    )
    .with_context(NodeContext {
        model_ids: vec![ModelId(10), ModelId(20)],
        ..NodeContext::default()
    });

    assert_eq!(resolver.get_visibility_status(&merged).await?, Visible);

    surface
        .set_category_override(ModelId(20), &[CategoryId(102)], CategoryOverride::Hide)
        .await;
    assert_eq!(resolver.get_visibility_status(&merged).await?, Partial);

    resolver.change_visibility(&merged, true).await?;
    assert_eq!(resolver.get_visibility_status(&merged).await?, Visible);
    Ok(())
}

#[tokio::test]
async fn test_model_off_keeps_overrides_and_on_resets_them() -> anyhow::Result<()> {
    let surface = displayed_surface();
    surface.set_never_drawn(ids(&[1000])).await;
    surface
        .set_category_override(ModelId(10), &[CategoryId(101)], CategoryOverride::Hide)
        .await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    resolver.change_visibility(&model_node(10), false).await?;
    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Hidden);
    assert_eq!(surface.never_drawn().await, ids(&[1000]));
    assert_eq!(
        surface.category_override(ModelId(10), CategoryId(101)).await,
        CategoryOverride::Hide
    );

    resolver.change_visibility(&model_node(10), true).await?;
    assert!(surface.never_drawn().await.is_empty());
    assert_eq!(
        surface.category_override(ModelId(10), CategoryId(101)).await,
        CategoryOverride::None
    );
    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Visible);
    Ok(())
}

#[tokio::test]
async fn test_container_change_reaches_models_through_hidden_containers() -> anyhow::Result<()> {
    let surface = Arc::new(InMemorySurface::new().with_enabled_categories([
        CategoryId(100),
        CategoryId(101),
        CategoryId(102),
    ]));
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    resolver.change_visibility(&container_node(1), true).await?;
    let displayed = surface.displayed_models().await;
    assert_eq!(
        displayed,
        [ModelId(10), ModelId(20), ModelId(30)].into_iter().collect()
    );
    assert_eq!(resolver.get_visibility_status(&container_node(1)).await?, Visible);

    resolver.change_visibility(&container_node(4), false).await?;
    assert!(!surface.is_model_displayed(ModelId(30)).await);
    assert_eq!(resolver.get_visibility_status(&container_node(1)).await?, Partial);
    Ok(())
}

#[tokio::test]
async fn test_grouping_node_aggregates_and_changes_in_bulk() -> anyhow::Result<()> {
    let surface = displayed_surface();
    surface.set_never_drawn(ids(&[1000])).await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();
    let group = TreeNode::new(
        NodeKey::ClassGrouping {
            class_name: "Element".to_string(),
            element_ids: vec![ElementId(1000), ElementId(1001)],
        },
        "Element",
    )
    .with_context(NodeContext {
        model_ids: vec![ModelId(10)],
        category_id: Some(CategoryId(100)),
        sub_model_id: None,
    });

    assert_eq!(resolver.get_visibility_status(&group).await?, Partial);

    resolver.change_visibility(&group, false).await?;
    assert_eq!(surface.never_drawn().await, ids(&[1000, 1001]));
    assert_eq!(resolver.get_visibility_status(&group).await?, Hidden);

    resolver.change_visibility(&group, true).await?;
    assert!(surface.never_drawn().await.is_empty());
    assert_eq!(resolver.get_visibility_status(&group).await?, Visible);
    Ok(())
}

#[tokio::test]
async fn test_exclusive_mode_hides_unlisted_elements() -> anyhow::Result<()> {
    let surface = displayed_surface();
    surface.set_always_drawn(ids(&[1000]), true).await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    assert_eq!(resolver.get_visibility_status(&element_node(1000, 10, 100)).await?, Visible);
    assert_eq!(resolver.get_visibility_status(&element_node(1001, 10, 100)).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&category_node(100, &[10])).await?, Partial);
    assert_eq!(resolver.get_visibility_status(&category_node(101, &[10])).await?, Hidden);

    resolver
        .change_visibility(&category_node(101, &[10]), true)
        .await?;
    assert_eq!(surface.always_drawn().await, ids(&[1000, 1002]));
    assert!(surface.is_always_drawn_exclusive().await);
    Ok(())
}

#[tokio::test]
async fn test_element_with_sub_model_merges_statuses() -> anyhow::Result<()> {
    let store = DatasetBuilder::new()
        .container(1, None, "Root")
        .model(10, 1, "Model")
        .sub_model(11, 1000, "Assembly")
        .category(100, "Walls")
        .category(101, "Parts")
        .element(1000, 10, 100, None, "Assembly element")
        .element(1100, 11, 101, None, "Bolt")
        .build()?;
    let surface = Arc::new(
        InMemorySurface::new()
            .with_displayed_models([ModelId(10)])
            .with_enabled_categories([CategoryId(100), CategoryId(101)]),
    );
    let session = session(store, &surface);
    let resolver = session.resolver();
    let node = TreeNode::new(NodeKey::Element(ElementId(1000)), "Assembly element").with_context(
        NodeContext {
            model_ids: vec![ModelId(10)],
            category_id: Some(CategoryId(100)),
            sub_model_id: Some(ModelId(11)),
        },
    );

    assert_eq!(resolver.get_visibility_status(&node).await?, Partial);

    resolver.change_visibility(&node, true).await?;
    assert!(surface.is_model_displayed(ModelId(11)).await);
    assert_eq!(resolver.get_visibility_status(&node).await?, Visible);

    resolver.change_visibility(&node, false).await?;
    assert!(!surface.is_model_displayed(ModelId(11)).await);
    assert_eq!(resolver.get_visibility_status(&node).await?, Hidden);
    Ok(())
}

#[tokio::test]
async fn test_status_hook_can_replace_or_call_through() -> anyhow::Result<()> {
    let surface = displayed_surface();
    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = Arc::clone(&calls);
    let overrides = VisibilityOverrides {
        model_status: Some(StatusOverride::new(
            move |props: ModelProps, default: DefaultStatus| -> StatusFuture {
                hook_calls.fetch_add(1, Ordering::SeqCst);
                if props.model_id == ModelId(30) {
                    Box::pin(async { Ok::<_, TreeError>(Disabled) })
                } else {
                    default()
                }
            },
        )),
        ..VisibilityOverrides::default()
    };
    let session = session_with(scene()?, Arc::clone(&surface), ungrouped(), overrides);
    let resolver = session.resolver();

    assert_eq!(resolver.get_visibility_status(&model_node(30)).await?, Disabled);
    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Visible);
    // The container aggregates through the hook; disabled models are skipped.
    assert_eq!(resolver.get_visibility_status(&container_node(4)).await?, Visible);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_dataset_change_invalidates_session_cache() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::new(scene()?));
    let surface = displayed_surface();
    let mut session = session_with(
        store.clone(),
        Arc::clone(&surface),
        ungrouped(),
        VisibilityOverrides::default(),
    );

    session.cache().get_parent_container_ids().await?;
    surface.set_spatial(true);
    surface.notify_dataset_changed();
    assert_eq!(session.pump_events(), 2);

    session.cache().get_parent_container_ids().await?;
    assert_eq!(store.count("all_containers"), 2);
    Ok(())
}

#[tokio::test]
async fn test_every_session_on_a_surface_sees_dataset_changes() -> anyhow::Result<()> {
    let first_store = Arc::new(CountingStore::new(scene()?));
    let second_store = Arc::new(CountingStore::new(scene()?));
    let surface = displayed_surface();
    let mut first = session_with(
        first_store.clone(),
        Arc::clone(&surface),
        ungrouped(),
        VisibilityOverrides::default(),
    );
    let mut second = session_with(
        second_store.clone(),
        Arc::clone(&surface),
        ungrouped(),
        VisibilityOverrides::default(),
    );
    first.cache().get_parent_container_ids().await?;
    second.cache().get_parent_container_ids().await?;

    surface.notify_dataset_changed();
    assert_eq!(first.pump_events(), 1);
    assert_eq!(second.pump_events(), 1);

    first.cache().get_parent_container_ids().await?;
    second.cache().get_parent_container_ids().await?;
    assert_eq!(first_store.count("all_containers"), 2);
    assert_eq!(second_store.count("all_containers"), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_category_change_leaves_surface_untouched() -> anyhow::Result<()> {
    let store = Arc::new(FailingStore::new(scene()?, "scope_elements_among", 2));
    let surface = Arc::new(
        InMemorySurface::new().with_enabled_categories([CategoryId(100), CategoryId(101)]),
    );
    surface.set_always_drawn(ids(&[1002]), false).await;
    surface.set_never_drawn(ids(&[1001])).await;
    let session = session_with(
        store,
        Arc::clone(&surface),
        ungrouped(),
        VisibilityOverrides::default(),
    );
    let resolver = session.resolver();
    let walls = category_node(100, &[10]);
    let doors = category_node(101, &[10]);

    let result = resolver.change_visibility(&walls, true).await;
    assert!(matches!(result, Err(TreeError::Storage(_))));
    assert!(!surface.is_model_displayed(ModelId(10)).await);
    assert_eq!(surface.always_drawn().await, ids(&[1002]));
    assert_eq!(surface.never_drawn().await, ids(&[1001]));
    assert_eq!(
        surface.category_override(ModelId(10), CategoryId(101)).await,
        CategoryOverride::None
    );
    assert_eq!(resolver.get_visibility_status(&doors).await?, Hidden);

    resolver.change_visibility(&walls, true).await?;
    assert!(surface.always_drawn().await.is_empty());
    assert!(surface.never_drawn().await.is_empty());
    assert_eq!(resolver.get_visibility_status(&walls).await?, Visible);
    assert_eq!(resolver.get_visibility_status(&doors).await?, Hidden);
    Ok(())
}

#[tokio::test]
async fn test_failed_model_change_leaves_surface_untouched() -> anyhow::Result<()> {
    let store = Arc::new(FailingStore::new(scene()?, "scope_elements_among", 1));
    let surface = Arc::new(InMemorySurface::new().with_enabled_categories([CategoryId(100)]));
    surface.set_never_drawn(ids(&[1001])).await;
    surface
        .set_category_override(ModelId(10), &[CategoryId(101)], CategoryOverride::Hide)
        .await;
    let session = session_with(
        store,
        Arc::clone(&surface),
        ungrouped(),
        VisibilityOverrides::default(),
    );
    let resolver = session.resolver();

    let result = resolver.change_visibility(&model_node(10), true).await;
    assert!(matches!(result, Err(TreeError::Storage(_))));
    assert!(!surface.is_model_displayed(ModelId(10)).await);
    assert_eq!(surface.never_drawn().await, ids(&[1001]));
    assert_eq!(
        surface.category_override(ModelId(10), CategoryId(101)).await,
        CategoryOverride::Hide
    );

    resolver.change_visibility(&model_node(10), true).await?;
    assert_eq!(resolver.get_visibility_status(&model_node(10)).await?, Visible);
    assert!(surface.never_drawn().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_never_drawn_wins_over_always_drawn_in_scope_counts() -> anyhow::Result<()> {
    let surface = displayed_surface();
    surface.set_always_drawn(ids(&[1000, 1001, 1003]), false).await;
    surface.set_never_drawn(ids(&[1000])).await;
    let session = session(scene()?, &surface);
    let resolver = session.resolver();

    assert_eq!(resolver.get_visibility_status(&element_node(1000, 10, 100)).await?, Hidden);
    assert_eq!(resolver.get_visibility_status(&category_node(100, &[10])).await?, Partial);
    Ok(())
}
