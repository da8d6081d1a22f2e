#![no_main]

use ftui_panes::{
    ClosePane, Command, CommandEngine, EngineConfig, EqualizeSplit, FocusPane, ModelConfig,
    MovePane, Node, NodeId, PaneId, ResizeDivider, SetPaneLock, SplitDirection, SplitPane,
    SwapPanes, TreeModel,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Each command consumes four bytes: opcode, two selectors, one scalar.
    let Ok(model) = TreeModel::with_root_pane(ModelConfig::default().with_max_panes(64), "root")
    else {
        return;
    };
    let mut engine = CommandEngine::new(model, EngineConfig::default().with_checkpoint_interval(4));

    for chunk in data.chunks_exact(4) {
        let [op, first, second, scalar] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        match op % 12 {
            10 => {
                let _ = engine.undo();
            }
            11 => {
                let _ = engine.redo();
            }
            code => {
                if let Some(command) = build(engine.model(), code, first, second, scalar) {
                    let _ = engine.execute(command);
                }
            }
        }

        // Post-conditions that must always hold:
        let violations = engine.model().validate();
        assert!(violations.is_empty(), "invalid tree: {violations:?}");
        let snapshot = engine.snapshot();
        assert!(snapshot.diff(&snapshot).is_empty(), "self diff not empty");
    }

    let document = engine.save();
    let restored = document
        .restore(ModelConfig::default().with_max_panes(64))
        .expect("saved document must restore");
    assert!(engine.snapshot().diff(&restored.snapshot()).is_empty());
});

fn pick<T: Copy>(items: &[T], raw: u8) -> Option<T> {
    (!items.is_empty()).then(|| items[usize::from(raw) % items.len()])
}

fn direction(raw: u8) -> SplitDirection {
    match raw % 4 {
        0 => SplitDirection::Left,
        1 => SplitDirection::Right,
        2 => SplitDirection::Up,
        _ => SplitDirection::Down,
    }
}

fn build(model: &TreeModel, code: u8, first: u8, second: u8, scalar: u8) -> Option<Box<dyn Command>> {
    let panes: Vec<PaneId> = model.pane_ids();
    let mut splits: Vec<NodeId> = Vec::new();
    if let Some(root) = model.root() {
        root.for_each(&mut |node| {
            if let Node::Split(split) = node {
                splits.push(split.node_id());
            }
        });
    }
    // Full byte range on purpose: 0 and 1 hit the ratio boundaries.
    let fraction = f64::from(scalar) / 255.0;

    let command: Box<dyn Command> = match code {
        0 | 1 => Box::new(SplitPane::new(pick(&panes, first)?, direction(second), fraction, "fuzz")),
        2 => Box::new(ClosePane::new(pick(&panes, first)?)),
        3 | 4 => Box::new(ResizeDivider::new(
            pick(&splits, first)?,
            usize::from(second % 4),
            fraction,
        )),
        5 => Box::new(EqualizeSplit::new(pick(&splits, first)?)),
        6 => Box::new(SwapPanes::new(pick(&panes, first)?, pick(&panes, second)?)),
        7 => Box::new(MovePane::new(
            pick(&panes, first)?,
            pick(&panes, second)?,
            direction(scalar),
            fraction,
        )),
        8 => Box::new(FocusPane::new(pick(&panes, first))),
        _ => Box::new(SetPaneLock::new(pick(&panes, first)?, scalar % 2 == 0)),
    };
    Some(command)
}
