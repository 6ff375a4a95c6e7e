use proc_macro2::LineColumn;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Expr, ExprCall, ExprMethodCall, ExprStruct, Member};

/// Position of one `name: value` entry inside the declaration literal.
#[derive(Debug, Clone)]
pub(crate) struct FieldSite {
    pub name: Option<String>,
    pub start: LineColumn,
    pub value_start: LineColumn,
    pub end: LineColumn,
    pub shorthand: bool,
}

/// Positions the annotator splices around, captured while the syntax tree is alive.
#[derive(Debug, Clone)]
pub(crate) struct DeclarationSite {
    pub open: LineColumn,
    pub close: LineColumn,
    pub fields: Vec<FieldSite>,
    pub rest: Option<LineColumn>,
}

impl DeclarationSite {
    fn from_literal(lit: &ExprStruct) -> Self {
        let fields = lit
            .fields
            .iter()
            .map(|field| {
                let name = match &field.member {
                    Member::Named(ident) => Some(ident.to_string()),
                    Member::Unnamed(_) => None,
                };
                let value = field.expr.span();
                FieldSite {
                    name,
                    start: field.member.span().start(),
                    value_start: value.start(),
                    end: value.end(),
                    shorthand: field.colon_token.is_none(),
                }
            })
            .collect();

        Self {
            open: lit.brace_token.span.open().start(),
            close: lit.brace_token.span.close().start(),
            fields,
            rest: lit.dot2_token.as_ref().map(|dots| dots.spans[0].start()),
        }
    }

    pub fn is_multiline(&self) -> bool {
        self.open.line != self.close.line
    }
}

/// Collects every call to `callee` that receives a struct literal.
pub(crate) struct DeclarationFinder<'c> {
    callee: &'c str,
    pub sites: Vec<DeclarationSite>,
    pub bare_calls: usize,
}

impl<'c> DeclarationFinder<'c> {
    pub fn new(callee: &'c str) -> Self {
        Self {
            callee,
            sites: Vec::new(),
            bare_calls: 0,
        }
    }

    fn record<'a>(&mut self, args: impl IntoIterator<Item = &'a Expr>) {
        let literal = args.into_iter().find_map(|arg| match arg {
            Expr::Struct(lit) => Some(lit),
            _ => None,
        });
        match literal {
            Some(lit) => self.sites.push(DeclarationSite::from_literal(lit)),
            None => self.bare_calls += 1,
        }
    }
}

impl<'ast> Visit<'ast> for DeclarationFinder<'_> {
    fn visit_expr_call(&mut self, call: &'ast ExprCall) {
        if let Expr::Path(func) = call.func.as_ref() {
            let matches = func
                .path
                .segments
                .last()
                .is_some_and(|seg| seg.ident == self.callee);
            if matches {
                self.record(&call.args);
            }
        }
        visit::visit_expr_call(self, call);
    }

    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        if call.method == self.callee {
            self.record(&call.args);
        }
        visit::visit_expr_method_call(self, call);
    }
}
