//! The instruction interpreter. A `TemplateExecutor` owns every piece of
//! per-run state and walks the frozen instruction tree of a shared
//! [`Stylesheet`]. It is also the evaluation host for XPath expressions, which
//! is how variables, `key()`, `format-number()` and extension functions reach
//! the run.
use crate::ast::{Instruction, InstructionId, TemplateDecl, VariableDecl};
use crate::compiler::XSLT_NAMESPACE;
use crate::config::TransformConfig;
use crate::diagnostics::{Diagnostic, DiagnosticListener};
use crate::error::ExecutionError;
use crate::executor_handlers::{
    apply_templates, call_template, control_flow, copy, extension, for_each, literals, variables,
};
use crate::extensions::{ExtensionRegistry, ExtensionValue};
use crate::frame::{FrameStack, FrameStats, GlobalLookup, GlobalPool, LinkedFrame};
use crate::keys::{self, KeyDecl, KeyIndex};
use crate::number_format::DecimalFormat;
use crate::output::{EventRecorder, ResultWriter};
use crate::sort::{self, KeyValue, SortDataType, SortKey};
use crate::stylesheet::{GlobalDecl, Stylesheet};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use weft_xpath1::functions::is_core_function;
use weft_xpath1::value::format_number;
use weft_xpath1::{
    DataSourceNode, EvaluationContext, EvaluationHost, Expression, NodeType, QualifiedName, TreeFragment, VarSlot,
    VariableRef, XPathError, XPathValue,
};

/// Functions the XSLT layer adds to the XPath core library.
const XSLT_FUNCTIONS: &[&str] = &[
    "key",
    "format-number",
    "system-property",
    "function-available",
    "element-available",
];

/// Instructions reported by `element-available()`.
const XSLT_INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

/// The context node with its 1-based position and the size of its node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Focus<N> {
    pub node: N,
    pub position: usize,
    pub size: usize,
}

impl<N> Focus<N> {
    pub fn new(node: N) -> Self {
        Self {
            node,
            position: 1,
            size: 1,
        }
    }

    pub fn at(node: N, position: usize, size: usize) -> Self {
        Self { node, position, size }
    }
}

/// The template rule whose body is running and the mode it was selected in.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleContext {
    pub template: Option<InstructionId>,
    pub mode: Option<QualifiedName>,
}

/// Decrements the invocation depth when a template body is left.
struct InvocationGuard<'c>(&'c Cell<usize>);

impl Drop for InvocationGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

pub struct TemplateExecutor<'s, 'a, N: DataSourceNode<'a> + 'a> {
    pub(crate) stylesheet: &'s Stylesheet,
    pub(crate) config: &'s TransformConfig,
    pub(crate) extensions: &'s ExtensionRegistry,
    listener: &'s dyn DiagnosticListener,
    root: N,
    parameters: HashMap<QualifiedName, XPathValue<N>>,
    frames: RefCell<FrameStack<N>>,
    globals: RefCell<GlobalPool<N>>,
    keys: RefCell<KeyIndex<N>>,
    rule: RefCell<RuleContext>,
    depth: Cell<usize>,
    current_instruction: Cell<Option<InstructionId>>,
    /// A runtime error raised inside the evaluation host, waiting to be lifted
    /// back out of the `XPathError` that carried it.
    pending: RefCell<Option<ExecutionError>>,
    _document: PhantomData<&'a ()>,
}

impl<'s, 'a, N: DataSourceNode<'a> + 'a> TemplateExecutor<'s, 'a, N> {
    pub fn new(
        stylesheet: &'s Stylesheet,
        config: &'s TransformConfig,
        extensions: &'s ExtensionRegistry,
        listener: &'s dyn DiagnosticListener,
        root: N,
    ) -> Self {
        Self {
            stylesheet,
            config,
            extensions,
            listener,
            root,
            parameters: HashMap::new(),
            frames: RefCell::new(FrameStack::new()),
            globals: RefCell::new(GlobalPool::new(stylesheet.globals().len())),
            keys: RefCell::new(KeyIndex::new()),
            rule: RefCell::new(RuleContext::default()),
            depth: Cell::new(0),
            current_instruction: Cell::new(None),
            pending: RefCell::new(None),
            _document: PhantomData,
        }
    }

    /// Values for top-level `xsl:param`s, by expanded name.
    pub fn with_parameters(mut self, parameters: HashMap<QualifiedName, XPathValue<N>>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Applies templates to the source root in `mode`.
    pub fn execute(&self, mode: Option<&QualifiedName>, out: &mut ResultWriter<'_>) -> Result<(), ExecutionError> {
        log::debug!(
            "starting run in mode {} over {} template rule(s)",
            mode.map(ToString::to_string).unwrap_or_else(|| "#default".into()),
            self.stylesheet.template_rule_count()
        );
        let result = self.apply_to_nodes(&[self.root], mode, &[], out);
        log::debug!("run finished: {:?}", self.frame_stats());
        result
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.frames.borrow().stats()
    }

    /// Number of frames currently linked. Zero outside a run.
    pub fn frame_depth(&self) -> usize {
        self.frames.borrow().depth()
    }

    pub fn frame_slot_count(&self) -> usize {
        self.frames.borrow().slot_count()
    }

    pub fn key_tables_built(&self) -> usize {
        self.keys.borrow().table_count()
    }

    // --- Instruction dispatch ---

    pub(crate) fn execute_children(
        &self,
        parent: InstructionId,
        focus: Focus<N>,
        out: &mut ResultWriter<'_>,
    ) -> Result<(), ExecutionError> {
        for &child in self.stylesheet.children(parent) {
            self.execute_instruction(child, focus, out)?;
        }
        Ok(())
    }

    fn execute_instruction(
        &self,
        id: InstructionId,
        focus: Focus<N>,
        out: &mut ResultWriter<'_>,
    ) -> Result<(), ExecutionError> {
        self.current_instruction.set(Some(id));
        match self.stylesheet.instruction(id) {
            Instruction::If { test } => control_flow::handle_if(self, id, test, focus, out),
            Instruction::Choose => control_flow::handle_choose(self, id, focus, out),
            Instruction::ForEach {
                select,
                sort_keys,
                frame_size,
            } => for_each::handle_for_each(self, id, select, sort_keys, *frame_size, focus, out),
            Instruction::ApplyTemplates {
                select,
                mode,
                sort_keys,
            } => apply_templates::handle_apply_templates(self, id, select.as_ref(), mode.as_ref(), sort_keys, focus, out),
            Instruction::ApplyImports => apply_templates::handle_apply_imports(self, focus, out),
            Instruction::CallTemplate { name, target } => {
                call_template::handle_call_template(self, id, name, *target, focus, out)
            }
            Instruction::Variable(decl) => variables::handle_variable(self, id, decl, focus),
            Instruction::Param(decl) => variables::handle_param(self, id, decl, focus),
            Instruction::Element {
                name,
                namespace,
                namespaces,
                use_attribute_sets,
            } => literals::handle_element(
                self,
                id,
                name,
                namespace.as_ref(),
                namespaces,
                use_attribute_sets,
                focus,
                out,
            ),
            Instruction::Attribute {
                name,
                namespace,
                namespaces,
            } => literals::handle_attribute(self, id, name, namespace.as_ref(), namespaces, focus, out),
            Instruction::LiteralElement {
                name,
                attributes,
                namespace_decls,
                use_attribute_sets,
            } => literals::handle_literal_element(
                self,
                id,
                name,
                attributes,
                namespace_decls,
                use_attribute_sets,
                focus,
                out,
            ),
            Instruction::Text {
                text,
                disable_escaping,
            } => {
                out.text(text, *disable_escaping);
                Ok(())
            }
            Instruction::ValueOf {
                select,
                disable_escaping,
            } => literals::handle_value_of(self, select, *disable_escaping, focus, out),
            Instruction::Copy { use_attribute_sets } => copy::handle_copy(self, id, use_attribute_sets, focus, out),
            Instruction::CopyOf { select } => copy::handle_copy_of(self, select, focus, out),
            Instruction::Comment => literals::handle_comment(self, id, focus, out),
            Instruction::ProcessingInstruction { name } => {
                literals::handle_processing_instruction(self, id, name, focus, out)
            }
            Instruction::Message { terminate } => extension::handle_message(self, id, *terminate, focus),
            Instruction::ExtensionCall { name, attributes } => {
                extension::handle_extension_call(self, id, name, attributes, focus, out)
            }
            // Only runs when its parent extension element is unavailable.
            Instruction::Fallback => Ok(()),
            other @ (Instruction::Template(_)
            | Instruction::When { .. }
            | Instruction::Otherwise
            | Instruction::WithParam(_)
            | Instruction::AttributeSet(_)) => Err(ExecutionError::Structure(format!(
                "{} cannot be executed as an instruction",
                other.display_name()
            ))),
        }
    }

    // --- Template invocation ---

    /// Runs template rules, or the built-in rules, for each node of `nodes` in turn.
    pub(crate) fn apply_to_nodes(
        &self,
        nodes: &[N],
        mode: Option<&QualifiedName>,
        params: &[(QualifiedName, XPathValue<N>)],
        out: &mut ResultWriter<'_>,
    ) -> Result<(), ExecutionError> {
        let size = nodes.len();
        for (i, &node) in nodes.iter().enumerate() {
            let focus = Focus::at(node, i + 1, size);
            match self.select_rule(mode, node, |_| true)? {
                Some(template) => {
                    let rule = RuleContext {
                        template: Some(template),
                        mode: mode.cloned(),
                    };
                    self.invoke_template(template, rule, focus, params, out)?;
                }
                None => self.apply_built_in(mode, focus, out)?,
            }
        }
        Ok(())
    }

    /// Picks the best rule in `mode` for `node` among those accepted by `filter`.
    pub(crate) fn select_rule<F>(
        &self,
        mode: Option<&QualifiedName>,
        node: N,
        filter: F,
    ) -> Result<Option<InstructionId>, ExecutionError>
    where
        F: Fn(&crate::dispatch::TemplateRule) -> bool,
    {
        let Some(table) = self.stylesheet.mode(mode) else {
            return Ok(None);
        };
        let selection = table.select(node, self, filter).map_err(|e| self.lift(e))?;
        let Some(selection) = selection else {
            return Ok(None);
        };
        if let Some(other) = selection.conflict {
            if self.config.warn_on_rule_conflicts {
                self.warn(
                    format!(
                        "Ambiguous rule match for {:?}: '{}' and '{}' tie, the later declaration is used",
                        node, selection.rule.pattern, other.pattern
                    ),
                    Some(selection.rule.template),
                );
            }
        }
        Ok(Some(selection.rule.template))
    }

    /// Built-in rules: roots and elements recurse into their children in the same
    /// mode, text and attributes copy their string value, the rest produce nothing.
    pub(crate) fn apply_built_in(
        &self,
        mode: Option<&QualifiedName>,
        focus: Focus<N>,
        out: &mut ResultWriter<'_>,
    ) -> Result<(), ExecutionError> {
        match focus.node.node_type() {
            NodeType::Root | NodeType::Element => {
                let children: Vec<N> = focus.node.children().collect();
                self.apply_to_nodes(&children, mode, &[], out)
            }
            NodeType::Text | NodeType::Attribute => {
                out.text(&focus.node.string_value(), false);
                Ok(())
            }
            NodeType::Comment | NodeType::ProcessingInstruction => Ok(()),
        }
    }

    /// Links a frame for `template`, binds `params` into its leading slots and
    /// runs its body with `rule` as the current template rule.
    pub(crate) fn invoke_template(
        &self,
        template: InstructionId,
        rule: RuleContext,
        focus: Focus<N>,
        params: &[(QualifiedName, XPathValue<N>)],
        out: &mut ResultWriter<'_>,
    ) -> Result<(), ExecutionError> {
        let decl = self.template_decl(template)?;
        let _guard = self.enter_invocation()?;
        let _frame = LinkedFrame::link(&self.frames, decl.frame_size);
        self.bind_params(decl, params)?;
        let saved = self.rule.replace(rule);
        let result = self.execute_children(template, focus, out);
        self.rule.replace(saved);
        result
    }

    pub(crate) fn template_decl(&self, template: InstructionId) -> Result<&'s TemplateDecl, ExecutionError> {
        match self.stylesheet.instruction(template) {
            Instruction::Template(decl) => Ok(decl),
            other => Err(ExecutionError::Structure(format!(
                "Expected a template, found {}",
                other.display_name()
            ))),
        }
    }

    fn bind_params(
        &self,
        decl: &TemplateDecl,
        params: &[(QualifiedName, XPathValue<N>)],
    ) -> Result<(), ExecutionError> {
        let mut frames = self.frames.borrow_mut();
        for (name, value) in params {
            match decl.params.iter().position(|p| p == name) {
                Some(index) => frames.set_local(index, value.clone())?,
                None => log::trace!("ignoring parameter '{}' not declared by the template", name),
            }
        }
        Ok(())
    }

    fn enter_invocation(&self) -> Result<InvocationGuard<'_>, ExecutionError> {
        let depth = self.depth.get();
        if depth >= self.config.max_recursion_depth {
            return Err(ExecutionError::RecursionLimit(self.config.max_recursion_depth));
        }
        self.depth.set(depth + 1);
        Ok(InvocationGuard(&self.depth))
    }

    pub(crate) fn current_rule(&self) -> RuleContext {
        self.rule.borrow().clone()
    }

    /// Runs `body` with the current template rule replaced by `rule`.
    pub(crate) fn with_rule<T>(&self, rule: RuleContext, body: impl FnOnce() -> T) -> T {
        let saved = self.rule.replace(rule);
        let result = body();
        self.rule.replace(saved);
        result
    }

    /// Evaluates the `xsl:with-param` children of `id` in the caller's context.
    pub(crate) fn evaluate_with_params(
        &self,
        id: InstructionId,
        focus: Focus<N>,
    ) -> Result<Vec<(QualifiedName, XPathValue<N>)>, ExecutionError> {
        let mut params = Vec::new();
        for &child in self.stylesheet.children(id) {
            if let Instruction::WithParam(decl) = self.stylesheet.instruction(child) {
                params.push((decl.name.clone(), self.variable_value(child, decl, focus)?));
            }
        }
        Ok(params)
    }

    // --- Variables ---

    /// The value of a variable-binding instruction: its select expression, else
    /// its body as a tree fragment, else the empty string.
    pub(crate) fn variable_value(
        &self,
        id: InstructionId,
        decl: &VariableDecl,
        focus: Focus<N>,
    ) -> Result<XPathValue<N>, ExecutionError> {
        if let Some(select) = &decl.select {
            return self.evaluate(select, focus);
        }
        if self.stylesheet.children(id).is_empty() {
            return Ok(XPathValue::String(String::new()));
        }
        Ok(XPathValue::Fragment(self.render_fragment(id, focus)?))
    }

    pub(crate) fn set_local(&self, slot: usize, value: XPathValue<N>) -> Result<(), ExecutionError> {
        self.frames.borrow_mut().set_local(slot, value)
    }

    pub(crate) fn is_local_set(&self, slot: usize) -> bool {
        self.frames.borrow().is_set(slot)
    }

    pub(crate) fn link_frame(&self, size: usize) -> LinkedFrame<'_, N> {
        LinkedFrame::link(&self.frames, size)
    }

    fn global_value(&self, index: usize) -> Result<XPathValue<N>, ExecutionError> {
        let Some(global) = self.stylesheet.globals().get(index) else {
            return Err(ExecutionError::Structure(format!("Global slot {} does not exist", index)));
        };
        let lookup = self.globals.borrow_mut().begin(index, &global.name.to_string())?;
        if let GlobalLookup::Ready(value) = lookup {
            return Ok(value);
        }
        match self.compute_global(global) {
            Ok(value) => {
                self.globals.borrow_mut().finish(index, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.globals.borrow_mut().abandon(index);
                Err(err)
            }
        }
    }

    fn compute_global(&self, global: &GlobalDecl) -> Result<XPathValue<N>, ExecutionError> {
        if global.is_param {
            if let Some(value) = self.parameters.get(&global.name) {
                return Ok(value.clone());
            }
        }
        let decl = match self.stylesheet.instruction(global.instruction) {
            Instruction::Variable(decl) | Instruction::Param(decl) => decl,
            other => {
                return Err(ExecutionError::Structure(format!(
                    "Global '{}' is bound to {}",
                    global.name,
                    other.display_name()
                )));
            }
        };
        log::trace!("evaluating global '{}'", global.name);
        // Globals are evaluated with the source root as context and no current rule.
        self.with_rule(RuleContext::default(), || {
            let _frame = self.link_frame(decl.frame_size);
            self.variable_value(global.instruction, decl, Focus::new(self.root))
        })
    }

    // --- Evaluation helpers ---

    fn context(&self, focus: Focus<N>) -> EvaluationContext<'a, '_, N> {
        EvaluationContext::new(focus.node, self).with_position(focus.position, focus.size)
    }

    pub(crate) fn evaluate(&self, expr: &Expression, focus: Focus<N>) -> Result<XPathValue<N>, ExecutionError> {
        weft_xpath1::evaluate(expr, &self.context(focus)).map_err(|e| self.lift(e))
    }

    pub(crate) fn evaluate_bool(&self, expr: &Expression, focus: Focus<N>) -> Result<bool, ExecutionError> {
        Ok(self.evaluate(expr, focus)?.to_bool())
    }

    /// Evaluates `expr` to a node-set; anything else is a type error naming `instruction`.
    pub(crate) fn evaluate_nodes(
        &self,
        expr: &Expression,
        focus: Focus<N>,
        instruction: &str,
    ) -> Result<Vec<N>, ExecutionError> {
        self.evaluate(expr, focus)?.into_node_set().map_err(|other| {
            ExecutionError::Type(format!(
                "{} must select a node-set, not a {}",
                instruction,
                other.type_name()
            ))
        })
    }

    pub(crate) fn evaluate_avt(&self, avt: &crate::avt::Avt, focus: Focus<N>) -> Result<String, ExecutionError> {
        avt.evaluate(|expr| self.evaluate(expr, focus).map(|value| value.to_string()))
    }

    pub(crate) fn sort_nodes(&self, nodes: Vec<N>, keys: &[SortKey]) -> Result<Vec<N>, ExecutionError> {
        sort::sort_by_keys(nodes, keys, |key, node, position, size| {
            let value = self.evaluate(&key.select, Focus::at(node, position, size))?;
            Ok(match key.data_type {
                SortDataType::Text => KeyValue::Text(value.to_string()),
                SortDataType::Number => KeyValue::Number(value.to_number()),
            })
        })
    }

    /// Runs the children of `parent` into a fresh recorder.
    pub(crate) fn render_fragment(&self, parent: InstructionId, focus: Focus<N>) -> Result<TreeFragment, ExecutionError> {
        let mut recorder = EventRecorder::new();
        {
            let mut writer = ResultWriter::new(&mut recorder);
            self.execute_children(parent, focus, &mut writer)?;
        }
        Ok(recorder.into_fragment())
    }

    /// The text content produced by the children of `parent`.
    pub(crate) fn render_text(&self, parent: InstructionId, focus: Focus<N>) -> Result<String, ExecutionError> {
        if self.stylesheet.children(parent).is_empty() {
            return Ok(String::new());
        }
        Ok(self.render_fragment(parent, focus)?.string_value().to_string())
    }

    /// Emits the attributes of each named set, after the sets it uses itself.
    pub(crate) fn apply_attribute_sets(
        &self,
        names: &[QualifiedName],
        focus: Focus<N>,
        out: &mut ResultWriter<'_>,
    ) -> Result<(), ExecutionError> {
        for name in names {
            let Some(id) = self.stylesheet.attribute_set(name) else {
                return Err(ExecutionError::Structure(format!("Unknown attribute set '{}'", name)));
            };
            let Instruction::AttributeSet(decl) = self.stylesheet.instruction(id) else {
                continue;
            };
            self.apply_attribute_sets(&decl.use_attribute_sets, focus, out)?;
            let _frame = self.link_frame(decl.frame_size);
            self.execute_children(id, focus, out)?;
        }
        Ok(())
    }

    // --- Diagnostics and errors ---

    /// Reports a warning at `at`, or at the instruction currently running.
    pub(crate) fn warn(&self, message: impl Into<String>, at: Option<InstructionId>) {
        let location = at
            .or(self.current_instruction.get())
            .map(|id| self.stylesheet.node(id).location);
        self.listener.report(&Diagnostic::warning(message, location));
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        self.listener.report(&diagnostic);
    }

    /// Recovers the runtime error carried through an `XPathError::Host`.
    pub(crate) fn lift(&self, err: XPathError) -> ExecutionError {
        let pending = self.pending.borrow_mut().take();
        pending.unwrap_or(ExecutionError::XPath(err))
    }

    fn host_error(&self, err: ExecutionError) -> XPathError {
        let message = err.to_string();
        *self.pending.borrow_mut() = Some(err);
        XPathError::Host(message)
    }

    // --- XSLT functions ---

    fn resolve_name(&self, lexical: &str) -> Result<QualifiedName, ExecutionError> {
        let mut name = QualifiedName::parse_lexical(lexical.trim())
            .ok_or_else(|| ExecutionError::Type(format!("'{}' is not a valid QName", lexical)))?;
        name.resolve(|prefix| self.stylesheet.namespaces().lookup(Some(prefix)).map(str::to_string))
            .map_err(|prefix| ExecutionError::Type(format!("Undeclared namespace prefix '{}' in '{}'", prefix, lexical)))?;
        Ok(name)
    }

    fn key_function(
        &self,
        args: Vec<XPathValue<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<XPathValue<N>, ExecutionError> {
        let [name, value]: [XPathValue<N>; 2] = args
            .try_into()
            .map_err(|_| ExecutionError::Type("key() takes exactly 2 arguments".into()))?;
        let lexical = name.to_string();
        let name = self.resolve_name(&lexical)?;
        let Some(decls) = self.stylesheet.key_decls(&name) else {
            return Err(ExecutionError::Type(format!("Unknown key '{}'", lexical)));
        };
        let root = e_ctx.context_node.root();
        let values: Vec<String> = match value {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
            other => vec![other.to_string()],
        };
        let mut found = Vec::new();
        for value in values {
            let cached = self.keys.borrow().lookup(root, &name, &value);
            let nodes = match cached {
                Some(nodes) => nodes,
                None => {
                    self.build_key(root, &name, decls)?;
                    self.keys.borrow().lookup(root, &name, &value).unwrap_or_default()
                }
            };
            found.extend(nodes);
        }
        found.sort();
        found.dedup();
        Ok(XPathValue::NodeSet(found))
    }

    fn build_key(&self, root: N, name: &QualifiedName, decls: &[KeyDecl]) -> Result<(), ExecutionError> {
        self.keys.borrow_mut().begin_build(root, name)?;
        let decls: Vec<&KeyDecl> = decls.iter().collect();
        match keys::build_table(root, &decls, self) {
            Ok(table) => {
                log::debug!("built key '{}' with {} distinct value(s)", name, table.len());
                self.keys.borrow_mut().finish_build(root, name, table);
                Ok(())
            }
            Err(err) => {
                self.keys.borrow_mut().abandon_build(root, name);
                Err(self.lift(err))
            }
        }
    }

    fn format_number_function(&self, args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, ExecutionError> {
        if !(2..=3).contains(&args.len()) {
            return Err(ExecutionError::Type("format-number() takes 2 or 3 arguments".into()));
        }
        let number = args[0].to_number();
        let picture = args[1].to_string();
        let fallback = DecimalFormat::default();
        let format = match args.get(2) {
            Some(name) => {
                let lexical = name.to_string();
                let resolved = self.resolve_name(&lexical)?;
                match self.stylesheet.decimal_format(Some(&resolved)) {
                    Some(format) => format,
                    None => {
                        self.warn(format!("Unknown decimal format '{}', using the default", lexical), None);
                        self.stylesheet.decimal_format(None).unwrap_or(&fallback)
                    }
                }
            }
            None => self.stylesheet.decimal_format(None).unwrap_or(&fallback),
        };
        let text = match format.format(number, &picture) {
            Ok(text) => text,
            Err(message) => {
                self.warn(format!("Malformed format-number pattern '{}': {}", picture, message), None);
                format_number(number)
            }
        };
        Ok(XPathValue::String(text))
    }

    fn single_name_argument(&self, function: &str, args: Vec<XPathValue<N>>) -> Result<QualifiedName, ExecutionError> {
        match args.as_slice() {
            [name] => self.resolve_name(&name.to_string()),
            _ => Err(ExecutionError::Type(format!("{}() takes exactly 1 argument", function))),
        }
    }

    fn system_property(&self, args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, ExecutionError> {
        let name = self.single_name_argument("system-property", args)?;
        if name.namespace_uri.as_deref() != Some(XSLT_NAMESPACE) {
            return Ok(XPathValue::String(String::new()));
        }
        Ok(match name.local_part.as_str() {
            "version" => XPathValue::Number(1.0),
            "vendor" => XPathValue::String(env!("CARGO_PKG_NAME").to_string()),
            "vendor-url" => XPathValue::String(env!("CARGO_PKG_REPOSITORY").to_string()),
            _ => XPathValue::String(String::new()),
        })
    }

    fn function_available(&self, args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, ExecutionError> {
        let name = self.single_name_argument("function-available", args)?;
        let available = is_core_function(&name) || self.has_function(&name);
        Ok(XPathValue::Boolean(available))
    }

    fn element_available(&self, args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, ExecutionError> {
        let name = self.single_name_argument("element-available", args)?;
        let available = match name.namespace_uri.as_deref() {
            Some(XSLT_NAMESPACE) => XSLT_INSTRUCTIONS.contains(&name.local_part.as_str()),
            Some(_) => self.extensions.has_element(&name),
            None => false,
        };
        Ok(XPathValue::Boolean(available))
    }

    fn extension_function(
        &self,
        name: &QualifiedName,
        uri: &str,
        args: Vec<XPathValue<N>>,
    ) -> Result<XPathValue<N>, ExecutionError> {
        let Some(handler) = self.extensions.handler(uri) else {
            return Err(ExecutionError::Extension {
                name: name.to_string(),
                message: "No handler is registered for the namespace".into(),
            });
        };
        let args: Vec<ExtensionValue> = args
            .into_iter()
            .map(|value| match value {
                XPathValue::Number(n) => ExtensionValue::Number(n),
                XPathValue::Boolean(b) => ExtensionValue::Boolean(b),
                other => ExtensionValue::String(other.to_string()),
            })
            .collect();
        let result = handler
            .function(&name.local_part, &args)
            .map_err(|message| ExecutionError::Extension {
                name: name.to_string(),
                message,
            })?;
        Ok(match result {
            ExtensionValue::String(s) => XPathValue::String(s),
            ExtensionValue::Number(n) => XPathValue::Number(n),
            ExtensionValue::Boolean(b) => XPathValue::Boolean(b),
        })
    }
}

impl<'s, 'a, N: DataSourceNode<'a> + 'a> EvaluationHost<'a, N> for TemplateExecutor<'s, 'a, N> {
    fn variable(&self, var: &VariableRef) -> Result<XPathValue<N>, XPathError> {
        match var.slot {
            Some(VarSlot::Local { depth, index }) => {
                let value = self.frames.borrow().get_local(depth, index).cloned();
                value.ok_or_else(|| {
                    self.host_error(ExecutionError::Structure(format!(
                        "Variable '${}' was read before it was bound",
                        var.name
                    )))
                })
            }
            Some(VarSlot::Global(index)) => self.global_value(index).map_err(|e| self.host_error(e)),
            None => Err(XPathError::UnknownVariable(var.name.to_string())),
        }
    }

    fn call_function(
        &self,
        name: &QualifiedName,
        args: Vec<XPathValue<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Option<Result<XPathValue<N>, XPathError>> {
        let result = match (name.namespace_uri.as_deref(), name.local_part.as_str()) {
            (None, "key") => self.key_function(args, e_ctx),
            (None, "format-number") => self.format_number_function(args),
            (None, "system-property") => self.system_property(args),
            (None, "function-available") => self.function_available(args),
            (None, "element-available") => self.element_available(args),
            (Some(uri), _) if self.extensions.has_function(name) => self.extension_function(name, uri, args),
            _ => return None,
        };
        Some(result.map_err(|e| self.host_error(e)))
    }

    fn has_function(&self, name: &QualifiedName) -> bool {
        match name.namespace_uri {
            None => XSLT_FUNCTIONS.contains(&name.local_part.as_str()),
            Some(_) => self.extensions.has_function(name),
        }
    }
}
