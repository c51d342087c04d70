use proc_macro::TokenStream;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;

/// Turns a function into a contract test.
///
/// `#[contract_test(pact_fn)]` or `#[contract_test(pact_fn, configure_fn)]`,
/// where `pact_fn() -> covenant::Pact` and
/// `configure_fn(&mut covenant::MockServerConfig)`. The function may take the
/// running `&covenant::MockServer` as its only argument. Log output goes
/// through `covenant::logging::init` with the default configuration.
#[proc_macro_attribute]
pub fn contract_test(attrs: TokenStream, item: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(item as syn::ItemFn);
    let args = syn::parse_macro_input!(attrs as syn::AttributeArgs);

    let attributes = &input.attrs;
    let visibility = &input.vis;
    let block = &input.block;
    let mut signature = input.sig.clone();

    if args.is_empty() || args.len() > 2 {
        return quote! {
            compile_error!("A pact function and an optional configuration function should be passed to the macro");
        }
        .into();
    }

    let pact_function = match &args[0] {
        syn::NestedMeta::Meta(syn::Meta::Path(function_path)) => function_path,
        other => {
            return quote_spanned! {other.span()=>
                compile_error!("The first argument should be a function returning the pact!");
            }
            .into();
        }
    };

    let configure = match args.get(1) {
        Some(syn::NestedMeta::Meta(syn::Meta::Path(function_path))) => quote! {
            #function_path(&mut __covenant_configuration);
        },
        Some(other) => {
            return quote_spanned! {other.span()=>
                compile_error!("The second argument should be a configuration function!");
            }
            .into();
        }
        None => quote! {},
    };

    let mock_argument = match signature.inputs.len() {
        0 => quote! { _ },
        1 => match &signature.inputs[0] {
            syn::FnArg::Typed(argument) => {
                let pattern = &argument.pat;
                quote! { #pattern }
            }
            syn::FnArg::Receiver(receiver) => {
                return quote_spanned! {receiver.span()=>
                    compile_error!("A contract test cannot take self!");
                }
                .into();
            }
        },
        _ => {
            return quote_spanned! {signature.inputs.span()=>
                compile_error!("A contract test takes at most the mock server as an argument!");
            }
            .into();
        }
    };
    signature.inputs.clear();

    let output = quote! {
        #[test]
        #(#attributes)*
        #visibility #signature {
            covenant::logging::init(&covenant::logging::LogConfig::default());
            let __covenant_pact = #pact_function();
            #[allow(unused_mut)]
            let mut __covenant_configuration = covenant::MockServerConfig::from_env()
                .unwrap_or_else(|e| panic!("Covenant configuration error: {}", e));
            #configure

            if let Err(e) = covenant::ContractTest::new(__covenant_pact, __covenant_configuration)
                .run(|#mock_argument: &covenant::MockServer| #block)
            {
                panic!("Covenant Error: {}", e);
            }
        }
    };

    TokenStream::from(output)
}
