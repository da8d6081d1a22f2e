#![no_main]

use ftui_panes::{ModelConfig, TreeDocument};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(document) = TreeDocument::from_json(text) else {
        return;
    };

    // Restore either rejects the document or yields a fully valid model.
    if let Ok(model) = document.restore(ModelConfig::default()) {
        let violations = model.validate();
        assert!(violations.is_empty(), "restored invalid tree: {violations:?}");

        // Fresh ids never collide with restored ones.
        let mut model = model;
        let pane = model.generate_pane_id().expect("pane id");
        assert!(!model.contains_pane(pane));
        let node = model.generate_node_id().expect("node id");
        assert!(!model.contains_node(node));

        // A restored model saves back to an equivalent document.
        let again = TreeDocument::from_model(&model);
        assert_eq!(again.root, document.root);
    }
});
