//! The compose pass: resolves names across modules, allocates variable slots,
//! validates instruction structure and freezes the per-mode rule tables.
use crate::ast::{Instruction, InstructionArena, InstructionId, NamespaceBindings};
use crate::compiler::{CompiledModules, NamespaceAlias};
use crate::dispatch::{ModeTable, TemplateRule};
use crate::error::{Location, XsltError};
use crate::keys::KeyDecl;
use crate::names::NamedTable;
use crate::slots::{ScopeKind, SlotAllocator};
use crate::stylesheet::{GlobalDecl, Stylesheet};
use std::collections::{HashMap, HashSet};
use weft_xpath1::{Expression, QualifiedName};

pub(crate) fn compose(modules: CompiledModules) -> Result<Stylesheet, XsltError> {
    let CompiledModules {
        mut arena,
        templates,
        globals: declared_globals,
        attribute_sets: declared_sets,
        keys: declared_keys,
        decimal_formats: declared_formats,
        namespace_aliases,
        namespaces,
        warnings,
    } = modules;

    let mut aliases: NamedTable<NamespaceAlias> = NamedTable::new();
    for alias in namespace_aliases {
        let key = QualifiedName::local(alias.value.stylesheet_uri.clone());
        aliases.insert(key, alias.precedence, alias.position, alias.value);
    }
    let aliases: Vec<&NamespaceAlias> = aliases.winners().map(|(_, alias)| alias).collect();
    if !aliases.is_empty() {
        apply_namespace_aliases(&mut arena, &aliases);
    }

    // Globals: one visible declaration per name.
    let mut global_table: NamedTable<InstructionId> = NamedTable::new();
    for global in &declared_globals {
        let name = variable_name(&arena, global.value);
        global_table.insert(name, global.precedence, global.position, global.value);
    }
    if let Some(name) = global_table.conflicts().first() {
        let location = global_table.get(name).map(|&id| arena.node(id).location).unwrap_or_default();
        return Err(XsltError::compose(
            format!("Global variable '{}' is declared more than once with the same import precedence", name),
            location,
        ));
    }
    let mut visible: Vec<InstructionId> = global_table.winners().map(|(_, &id)| id).collect();
    visible.sort();
    let globals: Vec<GlobalDecl> = visible
        .iter()
        .map(|&id| GlobalDecl {
            name: variable_name(&arena, id),
            instruction: id,
            is_param: matches!(arena.kind(id), Instruction::Param(_)),
        })
        .collect();
    let global_index: HashMap<QualifiedName, usize> =
        globals.iter().enumerate().map(|(i, g)| (g.name.clone(), i)).collect();

    let mut named: NamedTable<InstructionId> = NamedTable::new();
    for &id in &templates {
        if let Instruction::Template(decl) = arena.kind(id) {
            if let Some(name) = &decl.name {
                named.insert(name.clone(), decl.precedence, decl.position, id);
            }
        }
    }
    if let Some(name) = named.conflicts().first() {
        let location = named.get(name).map(|&id| arena.node(id).location).unwrap_or_default();
        return Err(XsltError::compose(
            format!("Template '{}' is declared more than once with the same import precedence", name),
            location,
        ));
    }
    let named_templates: HashMap<QualifiedName, InstructionId> =
        named.winners().map(|(name, &id)| (name.clone(), id)).collect();

    let mut set_table: NamedTable<InstructionId> = NamedTable::new();
    for &id in &declared_sets {
        if let Instruction::AttributeSet(decl) = arena.kind(id) {
            set_table.insert(decl.name.clone(), decl.precedence, decl.position, id);
        }
    }
    let attribute_sets: HashMap<QualifiedName, InstructionId> =
        set_table.winners().map(|(name, &id)| (name.clone(), id)).collect();

    let mut format_table = NamedTable::new();
    let mut default_format = None;
    for declared in declared_formats {
        let (name, format) = declared.value;
        match name {
            Some(name) => format_table.insert(name, declared.precedence, declared.position, format),
            None => {
                let rank = (declared.precedence, declared.position);
                if default_format.as_ref().is_none_or(|(r, _)| rank > *r) {
                    default_format = Some((rank, format));
                }
            }
        }
    }
    let mut decimal_formats: HashMap<_, _> = format_table
        .winners()
        .map(|(name, format)| (Some(name.clone()), format.clone()))
        .collect();
    decimal_formats.insert(None, default_format.map(|(_, f)| f).unwrap_or_default());

    let mut keys: HashMap<QualifiedName, Vec<KeyDecl>> = HashMap::new();
    for mut declared in declared_keys {
        let fixup = SlotAllocator::new(global_index.clone());
        for expr in declared.value.pattern.expressions_mut() {
            fixup.fixup(expr, Location::default())?;
        }
        fixup.fixup(&mut declared.value.use_expr, Location::default())?;
        keys.entry(declared.value.name.clone()).or_default().push(declared.value);
    }

    let mut composer = Composer {
        arena,
        alloc: SlotAllocator::new(global_index.clone()),
        named_templates: &named_templates,
        attribute_sets: &attribute_sets,
        keys: &keys,
        namespaces: &namespaces,
    };
    for &id in &visible {
        composer.compose_global(id)?;
    }
    for &id in set_table.winners().map(|(_, id)| id) {
        composer.compose_attribute_set(id)?;
    }
    composer.check_attribute_set_cycles()?;
    for &id in &templates {
        composer.compose_template(id)?;
    }
    let arena = composer.arena;

    let mut rules_by_mode: HashMap<Option<QualifiedName>, Vec<TemplateRule>> = HashMap::new();
    for &id in &templates {
        let Instruction::Template(decl) = arena.kind(id) else {
            continue;
        };
        let Some(pattern) = &decl.pattern else {
            continue;
        };
        for alternative in pattern.clone().split() {
            let score = alternative
                .alternatives()
                .first()
                .map(|alt| alt.default_priority())
                .unwrap_or(0.5);
            rules_by_mode.entry(decl.mode.clone()).or_default().push(TemplateRule {
                pattern: alternative,
                template: id,
                score,
                priority: decl.priority.unwrap_or(score),
                precedence: decl.precedence,
                position: decl.position,
            });
        }
    }
    let modes: HashMap<Option<QualifiedName>, ModeTable> = rules_by_mode
        .into_iter()
        .map(|(mode, rules)| (mode, ModeTable::build(rules)))
        .collect();

    log::debug!(
        "composed {} instructions: {} templates in {} mode(s), {} globals, {} key name(s)",
        arena.len(),
        templates.len(),
        modes.len(),
        globals.len(),
        keys.len()
    );

    Ok(Stylesheet {
        arena,
        modes,
        named_templates,
        globals,
        global_index,
        keys,
        attribute_sets,
        decimal_formats,
        namespaces,
        warnings,
    })
}

fn variable_name(arena: &InstructionArena, id: InstructionId) -> QualifiedName {
    match arena.kind(id) {
        Instruction::Variable(decl) | Instruction::Param(decl) | Instruction::WithParam(decl) => decl.name.clone(),
        _ => QualifiedName::local(""),
    }
}

fn alias_name(name: &mut QualifiedName, aliases: &[&NamespaceAlias]) {
    let Some(uri) = name.namespace_uri.as_deref() else {
        return;
    };
    if let Some(alias) = aliases.iter().find(|a| a.stylesheet_uri == uri) {
        if alias.result_uri.is_empty() {
            name.namespace_uri = None;
            name.prefix = None;
        } else {
            name.namespace_uri = Some(alias.result_uri.clone());
            name.prefix = alias.result_prefix.clone();
        }
    }
}

fn apply_namespace_aliases(arena: &mut InstructionArena, aliases: &[&NamespaceAlias]) {
    for index in 0..arena.len() {
        if let Instruction::LiteralElement {
            name,
            attributes,
            namespace_decls,
            ..
        } = &mut arena.node_mut(InstructionId(index)).kind
        {
            alias_name(name, aliases);
            for (attr_name, _) in attributes.iter_mut() {
                alias_name(attr_name, aliases);
            }
            for (prefix, uri) in namespace_decls.iter_mut() {
                if let Some(alias) = aliases.iter().find(|a| a.stylesheet_uri == *uri) {
                    *prefix = alias.result_prefix.clone();
                    uri.clone_from(&alias.result_uri);
                }
            }
            namespace_decls.retain(|(_, uri)| !uri.is_empty());
        }
    }
}

/// Key names written as string literals in `key('name', ...)` calls.
fn literal_key_names(expr: &Expression, out: &mut Vec<String>) {
    match expr {
        Expression::FunctionCall { name, args } => {
            if name.namespace_uri.is_none() && name.local_part == "key" {
                if let Some(Expression::Literal(key)) = args.first() {
                    out.push(key.clone());
                }
            }
            args.iter().for_each(|arg| literal_key_names(arg, out));
        }
        Expression::Filter { primary, predicates } => {
            literal_key_names(primary, out);
            predicates.iter().for_each(|p| literal_key_names(p, out));
        }
        Expression::BinaryOp { left, right, .. } => {
            literal_key_names(left, out);
            literal_key_names(right, out);
        }
        Expression::UnaryOp { expr, .. } => literal_key_names(expr, out),
        Expression::Literal(_) | Expression::Number(_) | Expression::LocationPath(_) | Expression::Variable(_) => {}
    }
}

/// How `walk` treats an instruction.
enum Step {
    Binding,
    ForEach,
    Call(QualifiedName),
    Apply,
    Choose,
    Body,
}

struct Composer<'c> {
    arena: InstructionArena,
    alloc: SlotAllocator,
    named_templates: &'c HashMap<QualifiedName, InstructionId>,
    attribute_sets: &'c HashMap<QualifiedName, InstructionId>,
    keys: &'c HashMap<QualifiedName, Vec<KeyDecl>>,
    namespaces: &'c NamespaceBindings,
}

impl Composer<'_> {
    fn compose_global(&mut self, id: InstructionId) -> Result<(), XsltError> {
        self.fixup_expressions(id)?;
        self.rewrite_single_text_body(id);
        if self.arena.children(id).is_empty() {
            return Ok(());
        }
        self.alloc.enter_scope(ScopeKind::Opaque);
        let walked = self.walk_children(id);
        let frame_size = self.alloc.end_scope();
        walked?;
        if let Instruction::Variable(decl) | Instruction::Param(decl) = &mut self.arena.node_mut(id).kind {
            decl.frame_size = frame_size;
        }
        Ok(())
    }

    fn compose_attribute_set(&mut self, id: InstructionId) -> Result<(), XsltError> {
        self.check_attribute_sets(id)?;
        self.alloc.enter_scope(ScopeKind::Opaque);
        let walked = self.walk_children(id);
        let frame_size = self.alloc.end_scope();
        walked?;
        if let Instruction::AttributeSet(decl) = &mut self.arena.node_mut(id).kind {
            decl.frame_size = frame_size;
        }
        Ok(())
    }

    fn compose_template(&mut self, id: InstructionId) -> Result<(), XsltError> {
        let node = self.arena.node_mut(id);
        let location = node.location;
        if let Instruction::Template(decl) = &mut node.kind {
            if let Some(pattern) = &mut decl.pattern {
                for expr in pattern.expressions_mut() {
                    // Match patterns see globals only.
                    self.alloc.fixup(expr, location)?;
                }
            }
        }
        self.alloc.enter_scope(ScopeKind::Opaque);
        let walked = self.walk_template_body(id);
        let frame_size = self.alloc.end_scope();
        let params = walked?;
        if let Instruction::Template(decl) = &mut self.arena.node_mut(id).kind {
            log::trace!(
                "template {} has frame size {} with {} parameter(s)",
                decl.name
                    .as_ref()
                    .map(ToString::to_string)
                    .or_else(|| decl.pattern.as_ref().map(|p| p.text().to_string()))
                    .unwrap_or_default(),
                frame_size,
                params.len()
            );
            decl.frame_size = frame_size;
            decl.params = params;
        }
        Ok(())
    }

    /// Walks a template body. Parameters must come first; they take the
    /// leading slots in declaration order.
    fn walk_template_body(&mut self, template: InstructionId) -> Result<Vec<QualifiedName>, XsltError> {
        let mut params: Vec<QualifiedName> = Vec::new();
        let mut body_started = false;
        for child in self.arena.children(template).to_vec() {
            let node = self.arena.node(child);
            if let Instruction::Param(decl) = &node.kind {
                if body_started {
                    return Err(XsltError::compose(
                        "xsl:param must come before the rest of the template body",
                        node.location,
                    ));
                }
                if params.contains(&decl.name) {
                    return Err(XsltError::compose(
                        format!("Parameter '{}' is declared twice", decl.name),
                        node.location,
                    ));
                }
                params.push(decl.name.clone());
            } else {
                body_started = true;
            }
            self.walk(child)?;
        }
        Ok(params)
    }

    fn walk_children(&mut self, parent: InstructionId) -> Result<(), XsltError> {
        self.alloc.push_block();
        let result = self
            .arena
            .children(parent)
            .to_vec()
            .into_iter()
            .try_for_each(|child| self.walk(child));
        self.alloc.pop_block();
        result
    }

    fn fixup_expressions(&mut self, id: InstructionId) -> Result<(), XsltError> {
        let node = self.arena.node_mut(id);
        let location = node.location;
        for expr in node.kind.expressions_mut() {
            self.alloc.fixup(expr, location)?;
            let mut used_keys = Vec::new();
            literal_key_names(expr, &mut used_keys);
            for key in used_keys {
                let known = QualifiedName::parse_lexical(&key)
                    .and_then(|mut name| {
                        name.resolve(|p| self.namespaces.lookup(Some(p)).map(str::to_string))
                            .ok()
                            .map(|_| name)
                    })
                    .is_some_and(|name| self.keys.contains_key(&name));
                if !known {
                    return Err(XsltError::compose(format!("Unknown key '{}'", key), location));
                }
            }
        }
        Ok(())
    }

    /// A variable whose body is a single text node or an escaping `xsl:value-of`
    /// becomes a string-valued select.
    fn rewrite_single_text_body(&mut self, id: InstructionId) {
        let [only] = self.arena.children(id) else {
            return;
        };
        let select = match self.arena.kind(*only) {
            Instruction::Text {
                text,
                disable_escaping: false,
            } => Expression::Literal(text.clone()),
            Instruction::ValueOf {
                select,
                disable_escaping: false,
            } => Expression::FunctionCall {
                name: QualifiedName::local("string"),
                args: vec![select.clone()],
            },
            _ => return,
        };
        if let Instruction::Variable(decl) | Instruction::Param(decl) | Instruction::WithParam(decl) =
            &mut self.arena.node_mut(id).kind
        {
            if decl.select.is_none() {
                decl.select = Some(select);
                self.arena.clear_children(id);
            }
        }
    }

    fn check_attribute_sets(&self, id: InstructionId) -> Result<(), XsltError> {
        let node = self.arena.node(id);
        let names = match &node.kind {
            Instruction::Element {
                use_attribute_sets, ..
            }
            | Instruction::LiteralElement {
                use_attribute_sets, ..
            }
            | Instruction::Copy { use_attribute_sets } => use_attribute_sets,
            Instruction::AttributeSet(decl) => &decl.use_attribute_sets,
            _ => return Ok(()),
        };
        match names.iter().find(|n| !self.attribute_sets.contains_key(*n)) {
            Some(missing) => Err(XsltError::compose(
                format!("Unknown attribute set '{}'", missing),
                node.location,
            )),
            None => Ok(()),
        }
    }

    fn check_attribute_set_cycles(&self) -> Result<(), XsltError> {
        fn visit(
            composer: &Composer<'_>,
            name: &QualifiedName,
            path: &mut Vec<QualifiedName>,
            done: &mut HashSet<QualifiedName>,
        ) -> Result<(), XsltError> {
            if done.contains(name) {
                return Ok(());
            }
            let Some(&id) = composer.attribute_sets.get(name) else {
                return Ok(());
            };
            if path.contains(name) {
                return Err(XsltError::compose(
                    format!("Attribute set '{}' uses itself", name),
                    composer.arena.node(id).location,
                ));
            }
            path.push(name.clone());
            if let Instruction::AttributeSet(decl) = composer.arena.kind(id) {
                for used in &decl.use_attribute_sets {
                    visit(composer, used, path, done)?;
                }
            }
            path.pop();
            done.insert(name.clone());
            Ok(())
        }
        let mut done = HashSet::new();
        for name in self.attribute_sets.keys() {
            visit(self, name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn check_choose(&self, id: InstructionId) -> Result<(), XsltError> {
        let node = self.arena.node(id);
        let branches: Vec<&Instruction> = node.children.iter().map(|&c| self.arena.kind(c)).collect();
        if !branches.iter().any(|b| matches!(b, Instruction::When { .. })) {
            return Err(XsltError::compose("xsl:choose needs at least one xsl:when", node.location));
        }
        let otherwise = branches.iter().filter(|b| matches!(b, Instruction::Otherwise)).count();
        if otherwise > 1 || (otherwise == 1 && !matches!(branches.last(), Some(Instruction::Otherwise))) {
            return Err(XsltError::compose(
                "xsl:otherwise must be the single last branch of xsl:choose",
                node.location,
            ));
        }
        Ok(())
    }

    fn walk(&mut self, id: InstructionId) -> Result<(), XsltError> {
        self.fixup_expressions(id)?;
        self.check_attribute_sets(id)?;
        let location = self.arena.node(id).location;
        let step = match self.arena.kind(id) {
            Instruction::Variable(_) | Instruction::Param(_) | Instruction::WithParam(_) => Step::Binding,
            Instruction::ForEach { .. } => Step::ForEach,
            Instruction::CallTemplate { name, .. } => Step::Call(name.clone()),
            Instruction::ApplyTemplates { .. } => Step::Apply,
            Instruction::Choose => Step::Choose,
            _ => Step::Body,
        };
        match step {
            Step::Binding => {
                self.rewrite_single_text_body(id);
                // The body cannot see the variable it defines.
                self.walk_children(id)?;
                let is_declaration = !matches!(self.arena.kind(id), Instruction::WithParam(_));
                if let Instruction::Variable(decl) | Instruction::Param(decl) = &mut self.arena.node_mut(id).kind {
                    if is_declaration {
                        decl.slot = self.alloc.declare(decl.name.clone());
                    }
                }
                Ok(())
            }
            Step::ForEach => {
                self.alloc.enter_scope(ScopeKind::Transparent);
                let walked = self.walk_children(id);
                let size = self.alloc.end_scope();
                walked?;
                if let Instruction::ForEach { frame_size, .. } = &mut self.arena.node_mut(id).kind {
                    *frame_size = size;
                }
                Ok(())
            }
            Step::Call(name) => {
                let target = self.named_templates.get(&name).copied().ok_or_else(|| {
                    XsltError::compose(format!("Unknown template '{}'", name), location)
                })?;
                if let Instruction::CallTemplate { target: slot, .. } = &mut self.arena.node_mut(id).kind {
                    *slot = Some(target);
                }
                self.walk_with_params(id)
            }
            Step::Apply => self.walk_with_params(id),
            Step::Choose => {
                self.check_choose(id)?;
                self.walk_children(id)
            }
            Step::Body => self.walk_children(id),
        }
    }

    fn walk_with_params(&mut self, id: InstructionId) -> Result<(), XsltError> {
        let mut seen: Vec<QualifiedName> = Vec::new();
        for &child in self.arena.children(id) {
            let node = self.arena.node(child);
            if let Instruction::WithParam(decl) = &node.kind {
                if seen.contains(&decl.name) {
                    return Err(XsltError::compose(
                        format!("Parameter '{}' is passed twice", decl.name),
                        node.location,
                    ));
                }
                seen.push(decl.name.clone());
            }
        }
        self.walk_children(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{InMemoryResolver, NoModules, compile_modules};
    use crate::config::TransformConfig;
    use weft_xpath1::VarSlot;

    fn compose_text(body: &str) -> Result<Stylesheet, XsltError> {
        let text = format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
            body
        );
        compose(compile_modules(&text, &NoModules, &TransformConfig::default())?)
    }

    fn value_of_slots(sheet: &Stylesheet) -> Vec<Option<VarSlot>> {
        (0..sheet.instruction_count())
            .filter_map(|i| match sheet.instruction(InstructionId(i)) {
                Instruction::ValueOf {
                    select: Expression::Variable(var),
                    ..
                } => Some(var.slot),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_sibling_shadowing_resolves_to_latest() {
        let sheet = compose_text(
            r#"<xsl:template match="/">
                 <xsl:variable name="x" select="1"/>
                 <xsl:variable name="x" select="2"/>
                 <xsl:value-of select="$x"/>
               </xsl:template>"#,
        )
        .unwrap();
        assert_eq!(value_of_slots(&sheet), vec![Some(VarSlot::Local { depth: 0, index: 1 })]);
    }

    #[test]
    fn test_block_slots_are_reused_and_frame_sized() {
        let sheet = compose_text(
            r#"<xsl:template name="t">
                 <xsl:param name="p"/>
                 <xsl:if test="1"><xsl:variable name="a" select="1"/><xsl:variable name="b" select="$a"/></xsl:if>
                 <xsl:if test="1"><xsl:variable name="c" select="1"/></xsl:if>
                 <xsl:for-each select="*">
                   <xsl:variable name="d" select="1"/>
                   <xsl:value-of select="$p"/>
                 </xsl:for-each>
               </xsl:template>"#,
        )
        .unwrap();
        let id = sheet.named_template(&QualifiedName::local("t")).unwrap();
        let Instruction::Template(decl) = sheet.instruction(id) else {
            unreachable!()
        };
        assert_eq!(decl.frame_size, 3);
        assert_eq!(decl.in_args_size(), 1);
        assert_eq!(value_of_slots(&sheet), vec![Some(VarSlot::Local { depth: 1, index: 0 })]);
        let for_each_size = (0..sheet.instruction_count()).find_map(|i| match sheet.instruction(InstructionId(i)) {
            Instruction::ForEach { frame_size, .. } => Some(*frame_size),
            _ => None,
        });
        assert_eq!(for_each_size, Some(1));
    }

    #[test]
    fn test_globals_and_undeclared_variables() {
        let sheet = compose_text(
            r#"<xsl:variable name="g" select="1"/>
               <xsl:template match="/"><xsl:value-of select="$g"/></xsl:template>"#,
        )
        .unwrap();
        assert_eq!(value_of_slots(&sheet), vec![Some(VarSlot::Global(0))]);

        let err = compose_text(r#"<xsl:template match="/"><xsl:value-of select="$missing"/></xsl:template>"#)
            .unwrap_err();
        assert!(matches!(err, XsltError::StaticCompose { .. }));
        assert!(err.to_string().contains("'$missing' is not declared"));

        let err = compose_text(
            r#"<xsl:template match="/"><xsl:variable name="x" select="$x"/></xsl:template>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'$x' is not declared"));
    }

    #[test]
    fn test_single_text_bodies_become_selects() {
        let sheet = compose_text(
            r#"<xsl:variable name="a">text</xsl:variable>
               <xsl:variable name="b"><xsl:value-of select="1 + 1"/></xsl:variable>
               <xsl:variable name="c"><x/></xsl:variable>"#,
        )
        .unwrap();
        let kinds: Vec<(bool, usize)> = sheet
            .globals()
            .iter()
            .map(|g| match sheet.instruction(g.instruction) {
                Instruction::Variable(decl) => (decl.select.is_some(), sheet.children(g.instruction).len()),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(kinds, vec![(true, 0), (true, 0), (false, 1)]);
        match sheet.instruction(sheet.globals()[0].instruction) {
            Instruction::Variable(decl) => assert_eq!(decl.select, Some(Expression::Literal("text".into()))),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_structural_errors() {
        let cases = [
            (r#"<xsl:template match="/"><xsl:call-template name="nope"/></xsl:template>"#, "Unknown template 'nope'"),
            (r#"<xsl:template match="/"><xsl:choose/></xsl:template>"#, "needs at least one xsl:when"),
            (
                r#"<xsl:template match="/"><xsl:choose><xsl:otherwise/><xsl:when test="1"/></xsl:choose></xsl:template>"#,
                "single last branch",
            ),
            (r#"<xsl:template name="t"><b/><xsl:param name="p"/></xsl:template>"#, "must come before"),
            (r#"<xsl:variable name="v"/><xsl:variable name="v"/>"#, "declared more than once"),
            (r#"<xsl:template name="t"/><xsl:template name="t"/>"#, "declared more than once"),
            (r#"<xsl:template match="/"><x xsl:use-attribute-sets="s"/></xsl:template>"#, "Unknown attribute set 's'"),
            (
                r#"<xsl:attribute-set name="a" use-attribute-sets="b"/><xsl:attribute-set name="b" use-attribute-sets="a"/>"#,
                "uses itself",
            ),
            (r#"<xsl:template match="/"><xsl:value-of select="key('k', 1)"/></xsl:template>"#, "Unknown key 'k'"),
        ];
        for (body, expected) in cases {
            let err = compose_text(body).unwrap_err().to_string();
            assert!(err.contains(expected), "{} -> {}", body, err);
        }
    }

    #[test]
    fn test_mode_tables_and_imported_overrides() {
        let resolver = InMemoryResolver::new().with_module(
            "base.xsl",
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                 <xsl:variable name="g" select="'base'"/>
                 <xsl:template name="t"/>
                 <xsl:template match="a | b" mode="m"/>
               </xsl:stylesheet>"#,
        );
        let main = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                 <xsl:import href="base.xsl"/>
                 <xsl:variable name="g" select="'main'"/>
                 <xsl:template name="t"/>
                 <xsl:template match="/"/>
               </xsl:stylesheet>"#;
        let sheet = compose(compile_modules(main, &resolver, &TransformConfig::default()).unwrap()).unwrap();
        assert_eq!(sheet.globals().len(), 1);
        assert_eq!(sheet.template_rule_count(), 3);
        assert_eq!(sheet.mode(Some(&QualifiedName::local("m"))).unwrap().rules().len(), 2);
        assert!(sheet.mode(None).is_some());
        let t = sheet.named_template(&QualifiedName::local("t")).unwrap();
        match sheet.instruction(t) {
            Instruction::Template(decl) => assert_eq!(decl.precedence, 2),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_namespace_alias_rewrites_literal_elements() {
        let sheet = compose_text(
            r#"<xsl:namespace-alias stylesheet-prefix="axsl" result-prefix="xsl"/>
               <xsl:template match="/"><axsl:stylesheet xmlns:axsl="urn:alias"/></xsl:template>"#,
        );
        // The alias prefix is declared below the stylesheet element, so the
        // declaration cannot see it.
        assert!(sheet.is_err());

        let text = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:axsl="urn:alias">
               <xsl:namespace-alias stylesheet-prefix="axsl" result-prefix="xsl"/>
               <xsl:template match="/"><axsl:stylesheet/></xsl:template>
            </xsl:stylesheet>"#;
        let sheet = compose(compile_modules(text, &NoModules, &TransformConfig::default()).unwrap()).unwrap();
        let literal = (0..sheet.instruction_count()).find_map(|i| match sheet.instruction(InstructionId(i)) {
            Instruction::LiteralElement {
                name,
                namespace_decls,
                ..
            } => Some((name.clone(), namespace_decls.clone())),
            _ => None,
        });
        let (name, decls) = literal.unwrap();
        assert_eq!(name.namespace_uri.as_deref(), Some(crate::compiler::XSLT_NAMESPACE));
        assert_eq!(name.prefix.as_deref(), Some("xsl"));
        assert_eq!(
            decls,
            vec![(Some("xsl".to_string()), crate::compiler::XSLT_NAMESPACE.to_string())]
        );
    }
}
