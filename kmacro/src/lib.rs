//! Macro definitions for kernel modules and the kernel API they bind to.
use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Ident, LitStr, Token, Type,
    ext::IdentExt,
    parse::{Parse, ParseStream},
    parse_macro_input,
};

/// Attribute macro to export a kernel API function under its C symbol name,
/// so a loaded module can resolve it at link time.
/// # Example:
/// ```ignore
/// #[capi_fn]
/// pub unsafe extern "C" fn kfree(ptr: *const c_void) { ... }
/// ```
#[proc_macro_attribute]
pub fn capi_fn(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as syn::ItemFn);
    let is_c_abi = func
        .sig
        .abi
        .as_ref()
        .and_then(|abi| abi.name.as_ref())
        .is_some_and(|name| name.value() == "C");
    if !is_c_abi {
        return syn::Error::new_spanned(&func.sig, "#[capi_fn] requires an `extern \"C\"` function")
            .to_compile_error()
            .into();
    }
    quote! {
        #[unsafe(no_mangle)]
        #func
    }
    .into()
}

struct ModuleArgs {
    ty: Option<Type>,
    name: Option<LitStr>,
    author: Option<LitStr>,
    version: Option<LitStr>,
    license: Option<LitStr>,
    description: Option<LitStr>,
}

impl Parse for ModuleArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut ty = None;
        let mut name = None;
        let mut author = None;
        let mut version = None;
        let mut license = None;
        let mut description = None;
        while !input.is_empty() {
            // `type` is a keyword, so accept any identifier here.
            let key = Ident::parse_any(input)?;
            input.parse::<Token![:]>()?;

            match key.to_string().as_str() {
                "type" => {
                    let value: Type = input.parse()?;
                    ty = Some(value);
                }
                "name" => {
                    let value: LitStr = input.parse()?;
                    if value.value().len() >= 56 {
                        return Err(syn::Error::new(value.span(), "module name is too long"));
                    }
                    name = Some(value);
                }
                "author" => {
                    let value: LitStr = input.parse()?;
                    author = Some(value);
                }
                "version" => {
                    let value: LitStr = input.parse()?;
                    version = Some(value);
                }
                "license" => {
                    let value: LitStr = input.parse()?;
                    license = Some(value);
                }
                "description" => {
                    let value: LitStr = input.parse()?;
                    description = Some(value);
                }
                _ => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("Unknown field: {}", key),
                    ));
                }
            }

            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(ModuleArgs {
            ty,
            name,
            author,
            version,
            license,
            description,
        })
    }
}

fn modinfo_entry(key: &str, value: &LitStr) -> Vec<u8> {
    let mut entry = format!("{}=", key).into_bytes();
    entry.extend_from_slice(value.value().as_bytes());
    entry.push(0);
    entry
}

/// Macro to declare a kernel module: its `.modinfo` metadata, the
/// `__this_module` descriptor and the `init_module`/`cleanup_module` entry
/// points driving a [`KernelModule`] type.
///
/// # Example:
/// ```ignore
/// module! {
///     type: HelloModule,
///     name: "hello",
///     author: "Fox",
///     version: "1.0.0",
///     license: "GPL",
///     description: "A simple hello world kernel module",
/// }
/// ```
///
/// Parameters can be in any order; `author` is optional.
///
/// [`KernelModule`]: ../kmod/trait.KernelModule.html
#[proc_macro]
pub fn module(item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(item as ModuleArgs);

    let ty = args.ty.expect("type is required");
    let name = args.name.expect("name is required");
    let version = args.version.expect("version is required");
    let license = args.license.expect("license is required");
    let description = args.description.expect("description is required");

    // All entries share one blob; the section is a flat key=value\0 list either way.
    let mut modinfo = modinfo_entry("name", &name);
    modinfo.extend(modinfo_entry("version", &version));
    modinfo.extend(modinfo_entry("license", &license));
    if let Some(author) = &args.author {
        modinfo.extend(modinfo_entry("author", author));
    }
    modinfo.extend(modinfo_entry("description", &description));
    let modinfo_len = modinfo.len();

    quote! {
        #[used]
        #[unsafe(link_section = ".modinfo")]
        pub static __MODINFO: [u8; #modinfo_len] = [#(#modinfo),*];

        static __MODULE_SLOT: kmod::ModuleSlot<#ty> = kmod::ModuleSlot::new();

        unsafe extern "C" fn init_module() -> core::ffi::c_int {
            __MODULE_SLOT.init(&__this_module)
        }

        unsafe extern "C" fn cleanup_module() {
            __MODULE_SLOT.exit()
        }

        #[used]
        #[allow(non_upper_case_globals)]
        #[unsafe(link_section = ".gnu.linkonce.this_module")]
        pub static __this_module: kmod::Module =
            kmod::Module::new(#name, Some(init_module), Some(cleanup_module));

        #[cfg(target_os = "none")]
        #[panic_handler]
        fn panic(_info: &core::panic::PanicInfo) -> ! {
            loop {}
        }
    }
    .into()
}
