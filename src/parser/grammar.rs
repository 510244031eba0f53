//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::{self, Item, Token};

/// Top-level entries of a template file
#[derive(Debug, Clone)]
enum TopLevel {
    Node(Spanned<Node>),
    Define(Definition),
}

/// Parse template source into an AST
pub fn parse(input: &str) -> Result<Document, Vec<crate::ParseError>> {
    let len = input.len();
    let items = lexer::scan(input).map_err(|e| vec![e])?;

    let token_iter = items.into_iter().map(|(item, span)| (item, span.into()));

    // Turn the item iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Item, SimpleSpan) into item and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    document_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn kw(token: Token) -> Item {
    Item::Token(token)
}

fn document_parser<'a, I>() -> impl Parser<'a, I, Document, extra::Err<Rich<'a, Item>>> + Clone
where
    I: ValueInput<'a, Token = Item, Span = SimpleSpan>,
{
    // `{{` followed by a keyword
    let open_kw = |t: Token| just(Item::Open).ignore_then(just(kw(t)));

    let end_tag = just(Item::Open)
        .then(just(kw(Token::End)))
        .then(just(Item::Close))
        .ignored();

    let else_tag = just(Item::Open)
        .then(just(kw(Token::Else)))
        .then(just(Item::Close))
        .ignored();

    let string_name = select! {
        Item::Token(Token::String(s)) => s,
    }
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    let variable_name = select! {
        Item::Token(Token::Variable(v)) if v.fields.is_empty() => v.name,
    }
    .map_with(|name, e| Spanned::new(name, span_range(&e.span())));

    // `$x :=`, `$i, $e :=`, `$x =`
    let declaration = variable_name
        .separated_by(just(kw(Token::Comma)))
        .at_least(1)
        .at_most(2)
        .collect::<Vec<_>>()
        .then(choice((
            just(kw(Token::Declare)).to(DeclarationKind::Declare),
            just(kw(Token::Assign)).to(DeclarationKind::Assign),
        )))
        .map(|(variables, kind)| Declaration { variables, kind });

    let pipeline = recursive(|pipeline| {
        let operand = choice((
            select! {
                Item::Token(Token::Dot) => Operand::Dot,
                Item::Token(Token::Field(fields)) => Operand::Field(fields),
                Item::Token(Token::Variable(v)) => Operand::Variable { name: v.name, fields: v.fields },
                Item::Token(Token::Ident(name)) => Operand::Function(name),
                Item::Token(Token::String(s)) => Operand::String(s),
                Item::Token(Token::Number(n)) => Operand::Number(n),
                Item::Token(Token::True) => Operand::Bool(true),
                Item::Token(Token::False) => Operand::Bool(false),
                Item::Token(Token::Nil) => Operand::Nil,
            },
            pipeline
                .delimited_by(just(kw(Token::ParenOpen)), just(kw(Token::ParenClose)))
                .map(|p| Operand::Pipeline(Box::new(p))),
        ))
        .map_with(|op, e| Spanned::new(op, span_range(&e.span())));

        let command = operand
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map_with(|operands, e| Spanned::new(Command { operands }, span_range(&e.span())));

        declaration
            .or_not()
            .then(
                command
                    .separated_by(just(kw(Token::Pipe)))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .map(|(declaration, commands)| Pipeline {
                declaration,
                commands,
            })
    });

    // Recursive node parser
    let node = recursive(|node| {
        let body = node.clone().repeated().collect::<Vec<_>>();

        let text = select! {
            Item::Text(s) => Node::Text(s),
        };

        let action = pipeline
            .clone()
            .delimited_by(just(Item::Open), just(Item::Close))
            .map(Node::Action);

        // `{{else if p}} ... ` chains share the closing `{{end}}`
        let if_tail = recursive(|tail| {
            choice((
                open_kw(Token::Else)
                    .then(just(kw(Token::If)))
                    .ignore_then(pipeline.clone())
                    .then_ignore(just(Item::Close))
                    .then(body.clone())
                    .then(tail.or_not())
                    .map_with(|((pipeline, body), otherwise), e| {
                        vec![Spanned::new(
                            Node::If(Branch {
                                pipeline,
                                body,
                                otherwise,
                            }),
                            span_range(&e.span()),
                        )]
                    }),
                else_tag.clone().ignore_then(body.clone()),
            ))
        });

        let with_tail = recursive(|tail| {
            choice((
                open_kw(Token::Else)
                    .then(just(kw(Token::With)))
                    .ignore_then(pipeline.clone())
                    .then_ignore(just(Item::Close))
                    .then(body.clone())
                    .then(tail.or_not())
                    .map_with(|((pipeline, body), otherwise), e| {
                        vec![Spanned::new(
                            Node::With(Branch {
                                pipeline,
                                body,
                                otherwise,
                            }),
                            span_range(&e.span()),
                        )]
                    }),
                else_tag.clone().ignore_then(body.clone()),
            ))
        });

        let if_node = open_kw(Token::If)
            .ignore_then(pipeline.clone())
            .then_ignore(just(Item::Close))
            .then(body.clone())
            .then(if_tail.or_not())
            .then_ignore(end_tag.clone())
            .map(|((pipeline, body), otherwise)| {
                Node::If(Branch {
                    pipeline,
                    body,
                    otherwise,
                })
            });

        let with_node = open_kw(Token::With)
            .ignore_then(pipeline.clone())
            .then_ignore(just(Item::Close))
            .then(body.clone())
            .then(with_tail.or_not())
            .then_ignore(end_tag.clone())
            .map(|((pipeline, body), otherwise)| {
                Node::With(Branch {
                    pipeline,
                    body,
                    otherwise,
                })
            });

        let range_node = open_kw(Token::Range)
            .ignore_then(pipeline.clone())
            .then_ignore(just(Item::Close))
            .then(body.clone())
            .then(else_tag.clone().ignore_then(body.clone()).or_not())
            .then_ignore(end_tag.clone())
            .map(|((pipeline, body), otherwise)| {
                Node::Range(Branch {
                    pipeline,
                    body,
                    otherwise,
                })
            });

        let template_node = open_kw(Token::Template)
            .ignore_then(string_name.clone())
            .then(pipeline.clone().or_not())
            .then_ignore(just(Item::Close))
            .map(|(name, pipeline)| Node::Template(TemplateCall { name, pipeline }));

        let block_node = open_kw(Token::Block)
            .ignore_then(string_name.clone())
            .then(pipeline.clone())
            .then_ignore(just(Item::Close))
            .then(body.clone())
            .then_ignore(end_tag.clone())
            .map(|((name, pipeline), body)| {
                Node::Block(BlockDecl {
                    name,
                    pipeline,
                    body,
                })
            });

        let break_node = open_kw(Token::Break)
            .then(just(Item::Close))
            .to(Node::Break);

        let continue_node = open_kw(Token::Continue)
            .then(just(Item::Close))
            .to(Node::Continue);

        // Note: Order matters! Keyword forms must come before plain actions.
        choice((
            text,
            if_node,
            range_node,
            with_node,
            template_node,
            block_node,
            break_node,
            continue_node,
            action,
        ))
        .map_with(|n, e| Spanned::new(n, span_range(&e.span())))
        .boxed()
    });

    // `{{define}}` is only allowed at the top level
    let definition = open_kw(Token::Define)
        .ignore_then(string_name)
        .then_ignore(just(Item::Close))
        .then(node.clone().repeated().collect::<Vec<_>>())
        .then_ignore(end_tag)
        .map(|(name, body)| TopLevel::Define(Definition { name, body }));

    choice((definition, node.map(TopLevel::Node)))
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map(|entries| {
            let mut body = Vec::new();
            let mut definitions = Vec::new();
            for entry in entries {
                match entry {
                    TopLevel::Node(n) => body.push(n),
                    TopLevel::Define(d) => definitions.push(d),
                }
            }
            Document { body, definitions }
        })
}
